//! Datagram decoder
//!
//! Turns a raw datagram into an [`AudioFrame`]. Decoding is pure: sequence
//! accounting belongs to the caller.

use bytes::Buf;

use crate::error::CodecError;
use crate::protocol::{AudioFrame, BYTES_PER_SAMPLE, HEADER_SIZE, MIN_PACKET_SIZE};

/// Stateless PCM datagram decoder
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketDecoder;

impl PacketDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode one datagram.
    ///
    /// Rejects datagrams shorter than [`MIN_PACKET_SIZE`] and datagrams whose
    /// payload is not a whole number of 16-bit samples.
    pub fn decode(&self, data: &[u8]) -> Result<AudioFrame, CodecError> {
        if data.len() < MIN_PACKET_SIZE {
            return Err(CodecError::Truncated(data.len()));
        }

        let payload_len = data.len() - HEADER_SIZE;
        if payload_len % BYTES_PER_SAMPLE != 0 {
            return Err(CodecError::OddPayload(payload_len));
        }

        let mut buf = data;
        let sequence = buf.get_u16_le();
        let timestamp = buf.get_u32_le();

        let mut samples = Vec::with_capacity(payload_len / BYTES_PER_SAMPLE);
        while buf.has_remaining() {
            samples.push(buf.get_i16_le());
        }

        Ok(AudioFrame::new(sequence, timestamp, samples))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every even-payload datagram of at least 8 bytes decodes to (len - 6) / 2 samples
        #[test]
        fn valid_length_decodes(sample_count in 1usize..700, fill in any::<u8>()) {
            let data = vec![fill; HEADER_SIZE + sample_count * 2];
            let frame = PacketDecoder::new().decode(&data).unwrap();
            prop_assert_eq!(frame.samples.len(), (data.len() - HEADER_SIZE) / 2);
        }

        /// Short or odd datagrams are always rejected
        #[test]
        fn invalid_length_rejected(data in proptest::collection::vec(any::<u8>(), 0..1400)) {
            let invalid = data.len() < MIN_PACKET_SIZE || (data.len() - HEADER_SIZE) % 2 == 1;
            prop_assert_eq!(PacketDecoder::new().decode(&data).is_err(), invalid);
        }
    }
}
