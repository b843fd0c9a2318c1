//! # UDP Audio Receiver
//!
//! Receives sequenced mono PCM datagrams over UDP and plays them back at a
//! fixed rate, optionally recording to a WAV file.
//!
//! ## Architecture Overview
//!
//! ```text
//!          UDP datagrams: [seq u16][timestamp u32][i16 PCM ...]
//!                                   │
//! ┌─────────────────────────────────┼───────────────────────────────────────┐
//! │  network-receive thread         ▼                                       │
//! │  ┌──────────────────────────────────────────┐                           │
//! │  │ AudioReceiver (network::receiver)         │  bounded recv timeout    │
//! │  └────────────────────┬─────────────────────┘                           │
//! │                       ▼                                                 │
//! │  ┌────────────────────────────────────────────────────────────────┐     │
//! │  │ StreamSession (session)                                        │     │
//! │  │   PacketDecoder ──► SequenceTracker (stats only) ──► push ─┐   │     │
//! │  │                                                            │   │     │
//! │  │                                   WavRecorder ◄── fan-out ─┤   │     │
//! │  └────────────────────────────────────────────────────────────┼───┘     │
//! └───────────────────────────────────────────────────────────────┼─────────┘
//!                                                                 ▼
//!                                          ┌──────────────────────────────┐
//!                                          │ JitterBuffer (audio::buffer) │
//!                                          │ ring, drop-oldest, one lock  │
//!                                          └──────────────┬───────────────┘
//! ┌───────────────────────────────────────────────────────┼─────────────────┐
//! │  render context (device callback)                     ▼                 │
//! │  ┌────────────────────────────────────────────────────────────────┐     │
//! │  │ AudioPlayback / HeadlessOutput (audio::playback)               │     │
//! │  │   session.render(frames) → pull, zero-fill shortfall           │     │
//! │  └────────────────────────────────────────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;
pub mod streamer;
pub mod ui;

pub use error::{Error, Result};
pub use session::{Classification, StatisticsSnapshot, StreamSession};
pub use streamer::UdpAudioStreamer;

/// Application-wide constants
pub mod constants {
    /// Default sample rate for playback
    pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

    /// Frames requested per device callback
    pub const DEFAULT_FRAMES_PER_BUFFER: u32 = 256;

    /// Default jitter buffer length (48000 samples at 16 kHz)
    pub const DEFAULT_JITTER_BUFFER_SECS: f32 = 3.0;

    /// Longest jitter buffer the config accepts
    pub const MAX_JITTER_BUFFER_SECS: f32 = 60.0;

    /// Highest sample rate the config accepts
    pub const MAX_SAMPLE_RATE: u32 = 384_000;

    /// Default UDP port for audio streaming
    pub const DEFAULT_UDP_PORT: u16 = 5000;

    /// Default HTTP port for the statistics API
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Receive timeout; bounds how long shutdown waits on the socket
    pub const DEFAULT_RECV_TIMEOUT_MS: u64 = 1000;

    /// Kernel receive buffer request
    pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1024 * 1024;

    /// Default packet duration used by the test sender
    pub const DEFAULT_PACKET_MS: f32 = 20.0;
}
