//! Network subsystem for UDP audio transport

pub mod receiver;
pub mod udp;

pub use receiver::{AudioReceiver, ReceiverStats};
pub use udp::{create_socket, DatagramSource};
