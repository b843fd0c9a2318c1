//! UDP socket setup

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::error::NetworkError;

/// Source of datagrams with a bounded wait
pub trait DatagramSource: Send {
    /// Receive the next datagram into `buf`.
    ///
    /// Returns `Ok(None)` when the receive timeout elapsed without data, so the
    /// caller can check its stop flag.
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;
}

impl DatagramSource for UdpSocket {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Create a bound UDP socket with a receive timeout.
///
/// Address reuse and the kernel receive buffer size are best effort.
pub fn create_socket(
    bind_addr: SocketAddr,
    recv_timeout: Duration,
    recv_buffer_size: usize,
) -> Result<UdpSocket, NetworkError> {
    let domain = if bind_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    if let Err(e) = socket.set_reuse_address(true) {
        tracing::warn!("setsockopt(SO_REUSEADDR) failed: {}", e);
    }

    if recv_buffer_size > 0 {
        if let Err(e) = socket.set_recv_buffer_size(recv_buffer_size) {
            tracing::warn!("Failed to set receive buffer size to {}: {}", recv_buffer_size, e);
        }
    }

    socket
        .bind(&bind_addr.into())
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", bind_addr, e)))?;

    socket
        .set_read_timeout(Some(recv_timeout))
        .map_err(|e| NetworkError::SocketOption(e.to_string()))?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_yields_none() {
        let mut socket = create_socket(
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_millis(20),
            0,
        )
        .unwrap();

        let mut buf = [0u8; 64];
        assert!(socket.recv_datagram(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_receive_datagram() {
        let mut socket = create_socket(
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_secs(2),
            64 * 1024,
        )
        .unwrap();
        let target = socket.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[1, 2, 3, 4, 5, 6, 7, 8], target).unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = socket.recv_datagram(&mut buf).unwrap().unwrap();
        assert_eq!(len, 8);
        assert_eq!(from, sender.local_addr().unwrap());
    }
}
