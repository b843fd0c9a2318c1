//! Bounded jitter buffer for PCM samples
//!
//! Single-producer single-consumer sample FIFO between the network receive
//! thread and the audio render callback. Storage is a fixed ring allocated
//! once; the producer never blocks on the consumer and the consumer never
//! waits for data.
//!
//! Overflow evicts the oldest samples (drop-oldest). Underrun is left to the
//! caller, which pads the shortfall with silence.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::AudioError;

/// Default upper bound for lock acquisition on the render path
pub const DEFAULT_RENDER_LOCK_TIMEOUT: Duration = Duration::from_micros(500);

struct Ring {
    /// Backing storage, length == capacity
    slots: Box<[i16]>,
    /// Index of the oldest sample
    head: usize,
    /// Occupied sample count
    len: usize,
    /// Cleared by `close()`
    open: bool,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn discard_front(&mut self, count: usize) {
        let count = count.min(self.len);
        self.head = (self.head + count) % self.capacity();
        self.len -= count;
    }

    fn write_back(&mut self, samples: &[i16]) {
        let capacity = self.capacity();
        let tail = (self.head + self.len) % capacity;
        let first = samples.len().min(capacity - tail);
        self.slots[tail..tail + first].copy_from_slice(&samples[..first]);
        self.slots[..samples.len() - first].copy_from_slice(&samples[first..]);
        self.len += samples.len();
    }

    fn read_front(&mut self, out: &mut [i16]) -> usize {
        let count = out.len().min(self.len);
        let capacity = self.capacity();
        let first = count.min(capacity - self.head);
        out[..first].copy_from_slice(&self.slots[self.head..self.head + first]);
        out[first..count].copy_from_slice(&self.slots[..count - first]);
        self.discard_front(count);
        count
    }
}

/// Bounded PCM sample queue with drop-oldest overflow
pub struct JitterBuffer {
    ring: Mutex<Ring>,
    data_available: Condvar,
    capacity: usize,
    render_lock_timeout: Duration,
    /// Pushes that had to evict
    overflow_events: AtomicU64,
    /// Samples discarded by eviction
    samples_evicted: AtomicU64,
    /// Pulls that gave up on the lock
    lock_misses: AtomicU64,
}

impl JitterBuffer {
    /// Create a buffer holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self::with_lock_timeout(capacity, DEFAULT_RENDER_LOCK_TIMEOUT)
    }

    /// Create a buffer sized for `seconds` of audio at `sample_rate`
    pub fn for_duration(sample_rate: u32, seconds: f32) -> Self {
        let capacity = (sample_rate as f32 * seconds).round() as usize;
        Self::new(capacity)
    }

    /// Create a buffer with an explicit render-side lock bound
    pub fn with_lock_timeout(capacity: usize, render_lock_timeout: Duration) -> Self {
        assert!(capacity > 0, "Capacity must be non-zero");

        Self {
            ring: Mutex::new(Ring {
                slots: vec![0i16; capacity].into_boxed_slice(),
                head: 0,
                len: 0,
                open: true,
            }),
            data_available: Condvar::new(),
            capacity,
            render_lock_timeout,
            overflow_events: AtomicU64::new(0),
            samples_evicted: AtomicU64::new(0),
            lock_misses: AtomicU64::new(0),
        }
    }

    /// Append samples, evicting the oldest ones if capacity would be exceeded.
    ///
    /// Returns the number of samples evicted. Fails only once the buffer is closed.
    pub fn push(&self, samples: &[i16]) -> Result<usize, AudioError> {
        if samples.is_empty() {
            return if self.ring.lock().open {
                Ok(0)
            } else {
                Err(AudioError::BufferClosed)
            };
        }

        let evicted = {
            let mut ring = self.ring.lock();
            if !ring.open {
                return Err(AudioError::BufferClosed);
            }

            let evicted = (ring.len + samples.len()).saturating_sub(self.capacity);
            // Samples that could never fit are dropped as the oldest of the batch
            let skip = samples.len().saturating_sub(self.capacity);
            ring.discard_front(evicted - skip);
            ring.write_back(&samples[skip..]);
            evicted
        };

        self.data_available.notify_one();

        if evicted > 0 {
            self.overflow_events.fetch_add(1, Ordering::Relaxed);
            self.samples_evicted.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!("Jitter buffer overflow, dropped {} oldest samples", evicted);
        }

        Ok(evicted)
    }

    /// Remove up to `frame_count` samples from the head
    pub fn pull(&self, frame_count: usize) -> Vec<i16> {
        let mut out = vec![0i16; frame_count];
        let count = self.pull_into(&mut out);
        out.truncate(count);
        out
    }

    /// Fill the front of `out` with buffered samples, returning how many were written.
    ///
    /// Never waits for data. Lock acquisition is bounded by the render lock
    /// timeout; a miss returns 0 and the caller pads with silence.
    pub fn pull_into(&self, out: &mut [i16]) -> usize {
        if out.is_empty() {
            return 0;
        }

        match self.ring.try_lock_for(self.render_lock_timeout) {
            Some(mut ring) => ring.read_front(out),
            None => {
                self.lock_misses.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Block a non-render consumer until `min` samples are buffered.
    ///
    /// Returns false on timeout or if the buffer is closed.
    pub fn wait_for_data(&self, min: usize, timeout: Duration) -> bool {
        let min = min.min(self.capacity);
        let deadline = Instant::now() + timeout;
        let mut ring = self.ring.lock();

        while ring.open && ring.len < min {
            if self.data_available.wait_until(&mut ring, deadline).timed_out() {
                break;
            }
        }

        ring.open && ring.len >= min
    }

    /// Discard buffered samples and stop accepting new ones
    pub fn close(&self) {
        {
            let mut ring = self.ring.lock();
            ring.open = false;
            ring.head = 0;
            ring.len = 0;
        }
        self.data_available.notify_all();
    }

    /// Discard buffered samples, staying operational
    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.head = 0;
        ring.len = 0;
    }

    /// Whether the buffer still accepts samples
    pub fn is_open(&self) -> bool {
        self.ring.lock().open
    }

    /// Current occupied sample count
    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get buffer capacity in samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity as f32
    }

    /// Pushes that have evicted samples so far
    pub fn overflow_events(&self) -> u64 {
        self.overflow_events.load(Ordering::Relaxed)
    }

    /// Get statistics
    pub fn stats(&self) -> JitterBufferStats {
        JitterBufferStats {
            level: self.len(),
            capacity: self.capacity,
            overflow_events: self.overflow_events.load(Ordering::Relaxed),
            samples_evicted: self.samples_evicted.load(Ordering::Relaxed),
            lock_misses: self.lock_misses.load(Ordering::Relaxed),
        }
    }

    /// Reset statistics
    pub fn reset_stats(&self) {
        self.overflow_events.store(0, Ordering::Relaxed);
        self.samples_evicted.store(0, Ordering::Relaxed);
        self.lock_misses.store(0, Ordering::Relaxed);
    }
}

/// Jitter buffer statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitterBufferStats {
    pub level: usize,
    pub capacity: usize,
    pub overflow_events: u64,
    pub samples_evicted: u64,
    pub lock_misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn ramp(start: i16, count: usize) -> Vec<i16> {
        (0..count as i16).map(|i| start + i).collect()
    }

    #[test]
    fn test_fifo_order() {
        let buffer = JitterBuffer::new(16);
        assert_eq!(buffer.push(&[1, 2, 3]).unwrap(), 0);
        assert_eq!(buffer.push(&[4, 5]).unwrap(), 0);
        assert_eq!(buffer.len(), 5);

        assert_eq!(buffer.pull(2), vec![1, 2]);
        assert_eq!(buffer.pull(10), vec![3, 4, 5]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drop_oldest_overflow() {
        let buffer = JitterBuffer::new(10);
        assert_eq!(buffer.push(&ramp(0, 6)).unwrap(), 0);
        assert_eq!(buffer.push(&ramp(100, 6)).unwrap(), 2);
        assert_eq!(buffer.len(), 10);

        // First two of the initial six are gone
        assert_eq!(
            buffer.pull(10),
            vec![2, 3, 4, 5, 100, 101, 102, 103, 104, 105]
        );

        let stats = buffer.stats();
        assert_eq!(stats.overflow_events, 1);
        assert_eq!(stats.samples_evicted, 2);
    }

    #[test]
    fn test_push_larger_than_capacity() {
        let buffer = JitterBuffer::new(4);
        buffer.push(&[1, 2]).unwrap();
        assert_eq!(buffer.push(&ramp(10, 6)).unwrap(), 4);
        assert_eq!(buffer.pull(8), vec![12, 13, 14, 15]);
    }

    #[test]
    fn test_wraparound_storage() {
        let buffer = JitterBuffer::new(5);
        buffer.push(&[1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.pull(3), vec![1, 2, 3]);
        buffer.push(&[5, 6, 7]).unwrap();
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.pull(4), vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_underrun_returns_available() {
        let buffer = JitterBuffer::new(10);
        assert!(buffer.pull(256).is_empty());

        buffer.push(&[9, 9, 9]).unwrap();
        let mut out = [0i16; 8];
        assert_eq!(buffer.pull_into(&mut out), 3);
        assert_eq!(&out[..3], &[9, 9, 9]);
    }

    #[test]
    fn test_close_rejects_and_discards() {
        let buffer = JitterBuffer::new(10);
        buffer.push(&[1, 2, 3]).unwrap();
        buffer.close();

        assert!(!buffer.is_open());
        assert!(buffer.is_empty());
        assert!(matches!(buffer.push(&[4]), Err(AudioError::BufferClosed)));
        assert!(buffer.pull(4).is_empty());
    }

    #[test]
    fn test_clear_keeps_buffer_open() {
        let buffer = JitterBuffer::new(10);
        buffer.push(&[1, 2, 3]).unwrap();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.push(&[4]).unwrap(), 0);
    }

    #[test]
    fn test_for_duration() {
        let buffer = JitterBuffer::for_duration(16000, 3.0);
        assert_eq!(buffer.capacity(), 48000);
        assert_eq!(buffer.fill_level(), 0.0);
    }

    #[test]
    fn test_wait_for_data() {
        let buffer = Arc::new(JitterBuffer::new(64));
        assert!(!buffer.wait_for_data(1, Duration::from_millis(10)));

        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                buffer.push(&[1; 8]).unwrap();
            })
        };

        assert!(buffer.wait_for_data(8, Duration::from_secs(5)));
        producer.join().unwrap();
    }

    #[test]
    fn test_render_lock_is_bounded() {
        let buffer = JitterBuffer::with_lock_timeout(8, Duration::from_millis(1));
        buffer.push(&[1, 2]).unwrap();

        let guard = buffer.ring.lock();
        let mut out = [0i16; 2];
        assert_eq!(buffer.pull_into(&mut out), 0);
        drop(guard);

        assert_eq!(buffer.stats().lock_misses, 1);
        assert_eq!(buffer.pull_into(&mut out), 2);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let buffer = Arc::new(JitterBuffer::new(1024));
        let total = 50_000usize;

        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let mut next = 0usize;
                while next < total {
                    let end = (next + 160).min(total);
                    let block: Vec<i16> = (next..end).map(|v| (v % 30000) as i16).collect();
                    buffer.push(&block).unwrap();
                    next = end;
                }
            })
        };

        let mut received = 0usize;
        let mut out = [0i16; 256];
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(10) {
            received += buffer.pull_into(&mut out);
            if producer.is_finished() && buffer.is_empty() {
                break;
            }
        }
        producer.join().unwrap();

        let evicted = buffer.stats().samples_evicted as usize;
        assert_eq!(received + evicted, total);
    }
}
