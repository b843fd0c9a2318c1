//! Error types for the audio receiver
//!
//! Only startup and shutdown failures travel through these types. Steady-state
//! anomalies (malformed datagrams, sequence gaps, overflow, underrun) are counted
//! by the component that sees them and never returned upward.

use thiserror::Error;

/// Main error type for the receiver
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Receiver already running")]
    AlreadyRunning,

    #[error("Receiver has been stopped; create a new one to restart")]
    Stopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Jitter buffer is closed")]
    BufferClosed,

    #[error("Output already running")]
    AlreadyRunning,

    #[error("Recorder error: {0}")]
    Recorder(String),
}

/// Datagram decoding rejections
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("Datagram too short: {0} bytes (minimum 8)")]
    Truncated(usize),

    #[error("Odd PCM payload length: {0} bytes")]
    OddPayload(usize),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Socket option failed: {0}")]
    SocketOption(String),

    #[error("Thread spawn failed: {0}")]
    SpawnFailed(String),
}

/// Result type alias for the receiver
pub type Result<T> = std::result::Result<T, Error>;
