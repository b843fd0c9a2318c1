//! PCM datagram codec
//!
//! Decoding for the receive path, encoding for the test sender.

pub mod decoder;
pub mod encoder;

pub use decoder::PacketDecoder;
pub use encoder::{PacketEncoder, ToneGenerator};
