//! Externally visible stream statistics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::buffer::JitterBufferStats;
use crate::session::tracker::SequenceStats;

/// Point-in-time copy of stream metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub packets_out_of_order: u64,
    pub bytes_received: u64,
    /// Datagrams rejected by the decoder
    pub transport_errors: u64,
    /// dropped / (received + dropped)
    pub drop_rate: f64,
    pub buffer_level: usize,
    pub buffer_capacity: usize,
    pub overflow_events: u64,
    pub samples_evicted: u64,
    /// Render ticks that needed silence padding
    pub underruns: u64,
    pub silence_samples: u64,
}

impl StatisticsSnapshot {
    pub(crate) fn compose(
        sequence: &SequenceStats,
        transport: &TransportCounters,
        buffer: &JitterBufferStats,
    ) -> Self {
        Self {
            packets_received: sequence.total_received,
            packets_dropped: sequence.total_dropped,
            packets_out_of_order: sequence.out_of_order,
            bytes_received: transport.bytes_received.load(Ordering::Relaxed),
            transport_errors: transport.transport_errors.load(Ordering::Relaxed),
            drop_rate: drop_rate(sequence.total_received, sequence.total_dropped),
            buffer_level: buffer.level,
            buffer_capacity: buffer.capacity,
            overflow_events: buffer.overflow_events,
            samples_evicted: buffer.samples_evicted,
            underruns: transport.underruns.load(Ordering::Relaxed),
            silence_samples: transport.silence_samples.load(Ordering::Relaxed),
        }
    }

    /// Drop rate as a percentage
    pub fn drop_rate_percent(&self) -> f64 {
        self.drop_rate * 100.0
    }
}

/// Fraction of expected packets that never arrived
pub fn drop_rate(received: u64, dropped: u64) -> f64 {
    let total = received + dropped;
    if total == 0 {
        0.0
    } else {
        dropped as f64 / total as f64
    }
}

/// Counters updated outside the sequence tracker
#[derive(Debug, Default)]
pub(crate) struct TransportCounters {
    pub bytes_received: AtomicU64,
    pub transport_errors: AtomicU64,
    pub underruns: AtomicU64,
    pub silence_samples: AtomicU64,
}

impl TransportCounters {
    pub fn reset(&self) {
        self.bytes_received.store(0, Ordering::Relaxed);
        self.transport_errors.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        self.silence_samples.store(0, Ordering::Relaxed);
    }
}
