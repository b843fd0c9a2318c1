//! Sequence number tracking and loss detection
//!
//! Classifies each received sequence number against the previous one. The
//! tracker never holds packets back; it always advances to the latest value
//! it has seen, so a late packet counts as out of order and the packet
//! after it counts again as a gap.

use serde::Serialize;

/// Half of the 16-bit sequence space
const WRAP_THRESHOLD: u16 = 32768;

/// Outcome of observing one sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    /// First packet of the stream, nothing to compare against
    FirstPacket,
    /// Exactly the expected successor
    InOrder,
    /// Sequence jumped forward; the payload is the number of missing packets
    Dropped(u16),
    /// Sequence went backwards (late, duplicate or reordered)
    OutOfOrder,
}

/// Running counters maintained by the tracker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SequenceStats {
    pub total_received: u64,
    pub total_dropped: u64,
    pub out_of_order: u64,
    /// `None` until the first packet is observed
    pub last_sequence: Option<u16>,
}

impl SequenceStats {
    /// Whether any packet has been observed since creation or reset
    pub fn first_packet_received(&self) -> bool {
        self.last_sequence.is_some()
    }
}

/// Loss and reorder classifier for a 16-bit wrapping sequence
#[derive(Debug, Default)]
pub struct SequenceTracker {
    stats: SequenceStats,
    /// Number of forward jumps, used to throttle gap warnings
    gaps: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a received sequence number
    pub fn observe(&mut self, sequence: u16) -> Classification {
        self.stats.total_received += 1;

        let Some(last) = self.stats.last_sequence.replace(sequence) else {
            return Classification::FirstPacket;
        };

        let expected = last.wrapping_add(1);
        if sequence == expected {
            return Classification::InOrder;
        }

        if Self::has_overtaken(sequence, expected) {
            let dropped = sequence.wrapping_sub(expected);
            self.stats.total_dropped += u64::from(dropped);
            self.gaps += 1;
            if self.gaps.is_power_of_two() {
                tracing::warn!(
                    "{} packet(s) dropped (seq {} to {}), {} dropped in total",
                    dropped,
                    expected,
                    sequence.wrapping_sub(1),
                    self.stats.total_dropped
                );
            } else {
                tracing::debug!("{} packet(s) dropped before seq {}", dropped, sequence);
            }
            Classification::Dropped(dropped)
        } else {
            self.stats.out_of_order += 1;
            if self.stats.out_of_order.is_power_of_two() {
                tracing::warn!(
                    "Out of order packet (seq {}, expected {}), {} in total",
                    sequence,
                    expected,
                    self.stats.out_of_order
                );
            } else {
                tracing::debug!("Out of order packet (seq {}, expected {})", sequence, expected);
            }
            Classification::OutOfOrder
        }
    }

    /// True when `current` is ahead of `expected`, allowing for one wrap past 65535.
    ///
    /// Cannot tell a duplicate from a reorder spanning more than half the sequence space.
    fn has_overtaken(current: u16, expected: u16) -> bool {
        current > expected || (expected > WRAP_THRESHOLD && current < WRAP_THRESHOLD)
    }

    /// Get a copy of the counters
    pub fn stats(&self) -> SequenceStats {
        self.stats
    }

    /// Return to the initial state and zero all counters
    pub fn reset(&mut self) {
        self.stats = SequenceStats::default();
        self.gaps = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe_all(tracker: &mut SequenceTracker, seqs: &[u16]) -> Vec<Classification> {
        seqs.iter().map(|&s| tracker.observe(s)).collect()
    }

    #[test]
    fn test_first_packet() {
        let mut tracker = SequenceTracker::new();
        assert!(!tracker.stats().first_packet_received());
        assert_eq!(tracker.observe(4000), Classification::FirstPacket);
        assert!(tracker.stats().first_packet_received());
        assert_eq!(tracker.stats().last_sequence, Some(4000));
    }

    #[test]
    fn test_in_order() {
        let mut tracker = SequenceTracker::new();
        let result = observe_all(&mut tracker, &[100, 101, 102]);
        assert_eq!(
            result,
            vec![
                Classification::FirstPacket,
                Classification::InOrder,
                Classification::InOrder
            ]
        );

        let stats = tracker.stats();
        assert_eq!(stats.total_received, 3);
        assert_eq!(stats.total_dropped, 0);
        assert_eq!(stats.out_of_order, 0);
    }

    #[test]
    fn test_gap() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(100);
        assert_eq!(tracker.observe(105), Classification::Dropped(4));
        assert_eq!(tracker.stats().total_dropped, 4);
        assert_eq!(tracker.observe(106), Classification::InOrder);
    }

    #[test]
    fn test_out_of_order() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(100);
        assert_eq!(tracker.observe(99), Classification::OutOfOrder);

        let stats = tracker.stats();
        assert_eq!(stats.out_of_order, 1);
        assert_eq!(stats.total_dropped, 0);
        // Reference point still advances to the late packet
        assert_eq!(stats.last_sequence, Some(99));
    }

    #[test]
    fn test_duplicate_is_out_of_order() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(10);
        assert_eq!(tracker.observe(10), Classification::OutOfOrder);
    }

    #[test]
    fn test_wraparound_in_order() {
        let mut tracker = SequenceTracker::new();
        let result = observe_all(&mut tracker, &[65534, 65535, 0, 1]);
        assert_eq!(&result[1..], &[Classification::InOrder; 3]);
    }

    #[test]
    fn test_wraparound_gap() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(65535);
        assert_eq!(tracker.observe(2), Classification::Dropped(2));
        assert_eq!(tracker.stats().total_dropped, 2);
        assert_eq!(tracker.stats().out_of_order, 0);
    }

    #[test]
    fn test_late_packet_after_gap() {
        let mut tracker = SequenceTracker::new();
        let result = observe_all(&mut tracker, &[1, 3, 2, 4]);
        assert_eq!(
            result,
            vec![
                Classification::FirstPacket,
                Classification::Dropped(1),
                Classification::OutOfOrder,
                Classification::Dropped(1),
            ]
        );
    }

    /// Collects formatted log output
    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_gap_warnings_are_throttled() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut tracker = SequenceTracker::new();
            let mut seq = 0u16;
            tracker.observe(seq);
            for _ in 0..10 {
                seq += 2;
                tracker.observe(seq);
            }
            for _ in 0..5 {
                tracker.observe(0);
            }
        });

        let log = String::from_utf8(captured.0.lock().clone()).unwrap();
        // Warnings at the 1st, 2nd, 4th and 8th gap, and the 1st, 2nd and 4th reorder
        assert_eq!(log.matches("dropped in total").count(), 4);
        assert_eq!(log.matches("Out of order").count(), 3);
    }

    #[test]
    fn test_reset() {
        let mut tracker = SequenceTracker::new();
        observe_all(&mut tracker, &[1, 5, 2]);
        tracker.reset();

        assert_eq!(tracker.stats(), SequenceStats::default());
        assert_eq!(tracker.observe(9), Classification::FirstPacket);
    }
}
