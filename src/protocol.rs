//! Wire format and shared data types
//!
//! ```text
//! 0        2                6                                    len
//! ┌────────┬────────────────┬──────────────────────────────────────┐
//! │ seq u16│ timestamp u32  │ N × i16 PCM (mono)                   │
//! └────────┴────────────────┴──────────────────────────────────────┘
//! all fields little-endian, N = (len - 6) / 2, N >= 1
//! ```

use serde::{Deserialize, Serialize};

/// Header length: 2-byte sequence number + 4-byte sample timestamp
pub const HEADER_SIZE: usize = 6;

/// Smallest valid datagram: header plus one sample
pub const MIN_PACKET_SIZE: usize = HEADER_SIZE + BYTES_PER_SAMPLE;

/// Size of one PCM sample on the wire
pub const BYTES_PER_SAMPLE: usize = 2;

/// Receive buffer size, the largest payload a UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// One decoded datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Sequence number, wraps modulo 65536
    pub sequence: u16,
    /// Sample-clock position of the first sample, wraps modulo 2^32
    pub timestamp: u32,
    /// Mono PCM samples, never empty
    pub samples: Vec<i16>,
}

impl AudioFrame {
    pub fn new(sequence: u16, timestamp: u32, samples: Vec<i16>) -> Self {
        Self {
            sequence,
            timestamp,
            samples,
        }
    }

    /// Number of samples carried by this frame
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Description of an audio output device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}
