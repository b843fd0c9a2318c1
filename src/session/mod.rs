//! Per-stream decode → track → buffer pipeline
//!
//! A [`StreamSession`] is shared between two threads: the network receive
//! thread calls [`StreamSession::on_datagram_received`] and the audio render
//! callback calls [`StreamSession::render`]. The jitter buffer is the only
//! state both of them touch.

pub mod stats;
pub mod tracker;

pub use stats::StatisticsSnapshot;
pub use tracker::{Classification, SequenceStats, SequenceTracker};

use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::audio::buffer::JitterBuffer;
use crate::audio::wav::SampleSink;
use crate::codec::PacketDecoder;
use crate::constants::{DEFAULT_JITTER_BUFFER_SECS, DEFAULT_SAMPLE_RATE};
use stats::TransportCounters;

/// Parameters fixed for the lifetime of a session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub sample_rate: u32,
    /// Jitter buffer capacity in samples
    pub buffer_capacity: usize,
}

impl SessionConfig {
    /// Size the jitter buffer for `seconds` of audio
    pub fn with_buffer_duration(sample_rate: u32, seconds: f32) -> Self {
        Self {
            sample_rate,
            buffer_capacity: ((sample_rate as f32 * seconds).round() as usize).max(1),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::with_buffer_duration(DEFAULT_SAMPLE_RATE, DEFAULT_JITTER_BUFFER_SECS)
    }
}

/// One logical audio stream
pub struct StreamSession {
    config: SessionConfig,
    decoder: PacketDecoder,
    /// Touched by the receive thread and snapshot readers, never by render
    tracker: Mutex<SequenceTracker>,
    buffer: JitterBuffer,
    counters: TransportCounters,
    sink: Option<Arc<dyn SampleSink>>,
}

impl StreamSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            decoder: PacketDecoder::new(),
            tracker: Mutex::new(SequenceTracker::new()),
            buffer: JitterBuffer::new(config.buffer_capacity),
            counters: TransportCounters::default(),
            sink: None,
        }
    }

    /// Fan out every buffered block to `sink` as well
    pub fn with_sink(mut self, sink: Arc<dyn SampleSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Handle one datagram from the transport.
    ///
    /// Returns the sequence classification, or `None` if the datagram was
    /// rejected. Classification is informational: every decoded frame is
    /// buffered regardless of loss or reordering.
    pub fn on_datagram_received(&self, data: &[u8]) -> Option<Classification> {
        let frame = match self.decoder.decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                let errors = self.counters.transport_errors.fetch_add(1, Ordering::Relaxed) + 1;
                if errors.is_power_of_two() {
                    tracing::warn!("Rejected datagram ({} total): {}", errors, e);
                } else {
                    tracing::debug!("Rejected datagram ({} total): {}", errors, e);
                }
                return None;
            }
        };

        // Received count and byte count move together under the tracker lock
        let classification = {
            let mut tracker = self.tracker.lock();
            self.counters
                .bytes_received
                .fetch_add(data.len() as u64, Ordering::Relaxed);
            tracker.observe(frame.sequence)
        };

        match self.buffer.push(&frame.samples) {
            Ok(0) => {}
            Ok(evicted) => {
                let events = self.buffer.overflow_events();
                if events.is_power_of_two() {
                    tracing::warn!(
                        "Audio buffer overflow, dropped {} samples ({} overflows total)",
                        evicted,
                        events
                    );
                }
            }
            Err(e) => {
                tracing::debug!("Discarding frame {}: {}", frame.sequence, e);
                return Some(classification);
            }
        }

        if let Some(sink) = &self.sink {
            sink.accept(&frame.samples);
        }

        Some(classification)
    }

    /// Fill `out` completely, padding any shortfall with silence.
    ///
    /// Called from the audio callback; never waits for the network.
    pub fn render(&self, out: &mut [i16]) {
        let provided = self.buffer.pull_into(out);
        if provided < out.len() {
            out[provided..].fill(0);
            self.counters.underruns.fetch_add(1, Ordering::Relaxed);
            self.counters
                .silence_samples
                .fetch_add((out.len() - provided) as u64, Ordering::Relaxed);
        }
    }

    /// Produce exactly `frame_count` samples
    pub fn on_render_tick(&self, frame_count: usize) -> Vec<i16> {
        let mut out = vec![0i16; frame_count];
        self.render(&mut out);
        out
    }

    /// Compute a fresh statistics snapshot
    pub fn statistics_snapshot(&self) -> StatisticsSnapshot {
        let tracker = self.tracker.lock();
        StatisticsSnapshot::compose(&tracker.stats(), &self.counters, &self.buffer.stats())
    }

    /// Zero all counters and forget the last sequence number
    pub fn reset_statistics(&self) {
        let mut tracker = self.tracker.lock();
        tracker.reset();
        self.counters.reset();
        self.buffer.reset_stats();
    }

    /// Stop buffering and discard pending samples
    pub fn close(&self) {
        self.buffer.close();
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Samples currently waiting for playback
    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Access the jitter buffer directly
    pub fn buffer(&self) -> &JitterBuffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PacketEncoder;

    struct CollectingSink(Mutex<Vec<i16>>);

    impl SampleSink for CollectingSink {
        fn accept(&self, samples: &[i16]) {
            self.0.lock().extend_from_slice(samples);
        }
    }

    fn session(capacity: usize) -> StreamSession {
        StreamSession::new(SessionConfig {
            sample_rate: 16000,
            buffer_capacity: capacity,
        })
    }

    #[test]
    fn test_pipeline_buffers_samples() {
        let session = session(100);
        let packet = PacketEncoder::encode(1, 0, &[1, 2, 3]);

        assert_eq!(
            session.on_datagram_received(&packet),
            Some(Classification::FirstPacket)
        );
        assert_eq!(session.buffered_samples(), 3);
        assert_eq!(session.on_render_tick(5), vec![1, 2, 3, 0, 0]);

        let stats = session.statistics_snapshot();
        assert_eq!(stats.packets_received, 1);
        assert_eq!(stats.bytes_received, 12);
        assert_eq!(stats.underruns, 1);
        assert_eq!(stats.silence_samples, 2);
    }

    #[test]
    fn test_rejected_datagram_is_counted() {
        let session = session(100);
        assert_eq!(session.on_datagram_received(&[1, 2, 3]), None);
        assert_eq!(session.on_datagram_received(&[0; 9]), None);

        let stats = session.statistics_snapshot();
        assert_eq!(stats.transport_errors, 2);
        assert_eq!(stats.packets_received, 0);
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(session.buffered_samples(), 0);
    }

    #[test]
    fn test_out_of_order_frames_still_buffered() {
        let session = session(100);
        session.on_datagram_received(&PacketEncoder::encode(10, 0, &[1]));
        session.on_datagram_received(&PacketEncoder::encode(15, 0, &[2]));
        session.on_datagram_received(&PacketEncoder::encode(12, 0, &[3]));

        assert_eq!(session.on_render_tick(3), vec![1, 2, 3]);

        let stats = session.statistics_snapshot();
        assert_eq!(stats.packets_dropped, 4);
        assert_eq!(stats.packets_out_of_order, 1);
        assert_eq!(stats.drop_rate, 4.0 / 7.0);
    }

    #[test]
    fn test_render_always_full_length() {
        let session = session(100);
        assert_eq!(session.on_render_tick(256), vec![0i16; 256]);
        assert!(session.on_render_tick(0).is_empty());
    }

    #[test]
    fn test_overflow_reported_in_snapshot() {
        let session = session(10);
        session.on_datagram_received(&PacketEncoder::encode(0, 0, &[1; 6]));
        session.on_datagram_received(&PacketEncoder::encode(1, 6, &[2; 6]));

        let stats = session.statistics_snapshot();
        assert_eq!(stats.buffer_level, 10);
        assert_eq!(stats.overflow_events, 1);
        assert_eq!(stats.samples_evicted, 2);
    }

    #[test]
    fn test_snapshot_idempotent() {
        let session = session(100);
        session.on_datagram_received(&PacketEncoder::encode(0, 0, &[1; 4]));
        session.on_datagram_received(&PacketEncoder::encode(3, 4, &[1; 4]));

        assert_eq!(session.statistics_snapshot(), session.statistics_snapshot());
    }

    #[test]
    fn test_reset_statistics() {
        let session = session(100);
        session.on_datagram_received(&PacketEncoder::encode(0, 0, &[1; 4]));
        session.on_datagram_received(&[0; 3]);
        session.reset_statistics();

        let stats = session.statistics_snapshot();
        assert_eq!(stats.packets_received, 0);
        assert_eq!(stats.transport_errors, 0);
        assert_eq!(stats.bytes_received, 0);
        // Buffered audio is untouched
        assert_eq!(stats.buffer_level, 4);
        assert_eq!(
            session.on_datagram_received(&PacketEncoder::encode(50, 0, &[1])),
            Some(Classification::FirstPacket)
        );
    }

    #[test]
    fn test_reset_keeps_counters_consistent() {
        let session = Arc::new(session(64));
        let packet = PacketEncoder::encode(0, 0, &[1; 10]);
        let packet_len = packet.len() as u64;

        let producer = {
            let session = session.clone();
            std::thread::spawn(move || {
                for seq in 0..5000u16 {
                    session.on_datagram_received(&PacketEncoder::encode(seq, 0, &[1; 10]));
                }
            })
        };

        while !producer.is_finished() {
            session.reset_statistics();
            let stats = session.statistics_snapshot();
            assert_eq!(stats.bytes_received, stats.packets_received * packet_len);
        }
        producer.join().unwrap();

        let stats = session.statistics_snapshot();
        assert_eq!(stats.bytes_received, stats.packets_received * packet_len);
    }

    #[test]
    fn test_sink_receives_buffered_samples() {
        let sink = Arc::new(CollectingSink(Mutex::new(Vec::new())));
        let session = session(100).with_sink(sink.clone());

        session.on_datagram_received(&PacketEncoder::encode(0, 0, &[5, 6]));
        session.on_datagram_received(&[0; 5]);
        session.on_datagram_received(&PacketEncoder::encode(1, 2, &[7]));

        assert_eq!(*sink.0.lock(), vec![5, 6, 7]);
    }

    #[test]
    fn test_closed_session_discards() {
        let session = session(100);
        session.on_datagram_received(&PacketEncoder::encode(0, 0, &[1; 4]));
        session.close();

        assert_eq!(session.buffered_samples(), 0);
        assert_eq!(
            session.on_datagram_received(&PacketEncoder::encode(1, 4, &[1; 4])),
            Some(Classification::InOrder)
        );
        assert_eq!(session.buffered_samples(), 0);
    }

    #[test]
    fn test_default_config_is_three_seconds() {
        let config = SessionConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.buffer_capacity, 48000);
    }
}
