//! Datagram encoder and test tone source
//!
//! Produces the same wire format the receiver decodes. Used by the `sender`
//! binary to drive a receiver without real capture hardware.

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::{BYTES_PER_SAMPLE, HEADER_SIZE};

/// Stateful packet encoder that numbers datagrams
pub struct PacketEncoder {
    /// Next sequence number
    sequence: u16,
    /// Sample-clock position of the next packet
    timestamp: u32,
    /// Packets produced
    packets_encoded: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl PacketEncoder {
    /// Create an encoder starting at sequence 0, timestamp 0
    pub fn new() -> Self {
        Self::starting_at(0, 0)
    }

    /// Create an encoder starting at an arbitrary position
    pub fn starting_at(sequence: u16, timestamp: u32) -> Self {
        Self {
            sequence,
            timestamp,
            packets_encoded: 0,
            bytes_produced: 0,
        }
    }

    /// Encode a single datagram
    pub fn encode(sequence: u16, timestamp: u32, samples: &[i16]) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + samples.len() * BYTES_PER_SAMPLE);
        buf.put_u16_le(sequence);
        buf.put_u32_le(timestamp);
        for &sample in samples {
            buf.put_i16_le(sample);
        }
        buf.freeze()
    }

    /// Encode the next datagram and advance sequence and timestamp
    pub fn next_packet(&mut self, samples: &[i16]) -> Bytes {
        let packet = Self::encode(self.sequence, self.timestamp, samples);

        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(samples.len() as u32);
        self.packets_encoded += 1;
        self.bytes_produced += packet.len() as u64;

        packet
    }

    /// Skip sequence numbers without emitting packets (simulated loss)
    pub fn skip(&mut self, packets: u16, samples_per_packet: usize) {
        self.sequence = self.sequence.wrapping_add(packets);
        self.timestamp = self
            .timestamp
            .wrapping_add((samples_per_packet as u32).wrapping_mul(packets as u32));
    }

    /// Sequence number the next packet will carry
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp the next packet will carry
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            packets_encoded: self.packets_encoded,
            bytes_produced: self.bytes_produced,
        }
    }
}

impl Default for PacketEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub packets_encoded: u64,
    pub bytes_produced: u64,
}

/// Continuous sine source with phase carried across blocks
pub struct ToneGenerator {
    phase: f64,
    step: f64,
    amplitude: f64,
}

impl ToneGenerator {
    /// `amplitude` is a fraction of full scale, clamped to 0.0..=1.0
    pub fn new(frequency: f64, sample_rate: u32, amplitude: f64) -> Self {
        Self {
            phase: 0.0,
            step: 2.0 * std::f64::consts::PI * frequency / sample_rate as f64,
            amplitude: amplitude.clamp(0.0, 1.0),
        }
    }

    /// Fill `out` with the next samples of the tone
    pub fn fill(&mut self, out: &mut [i16]) {
        for sample in out.iter_mut() {
            let value = self.amplitude * self.phase.sin() * i16::MAX as f64;
            *sample = value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
            self.phase += self.step;
            if self.phase >= std::f64::consts::TAU {
                self.phase -= std::f64::consts::TAU;
            }
        }
    }

    /// Produce the next `count` samples
    pub fn next_block(&mut self, count: usize) -> Vec<i16> {
        let mut block = vec![0i16; count];
        self.fill(&mut block);
        block
    }
}
