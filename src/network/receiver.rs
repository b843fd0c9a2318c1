//! Network receive thread
//!
//! Runs one loop per session: wait for a datagram (bounded by the socket
//! timeout), hand it to the session, repeat until stopped. Nothing here is
//! fatal once the thread is running; socket errors are logged and counted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::NetworkError;
use crate::network::udp::DatagramSource;
use crate::protocol::MAX_DATAGRAM_SIZE;
use crate::session::StreamSession;

/// Counters owned by the receive thread
#[derive(Debug, Default)]
struct Counters {
    datagrams: AtomicU64,
    timeouts: AtomicU64,
    socket_errors: AtomicU64,
}

/// Receive-side statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverStats {
    pub datagrams: u64,
    pub timeouts: u64,
    pub socket_errors: u64,
}

/// Background datagram receiver feeding a [`StreamSession`]
pub struct AudioReceiver {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl AudioReceiver {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Spawn the receive thread
    pub fn start<S>(&mut self, mut source: S, session: Arc<StreamSession>) -> Result<(), NetworkError>
    where
        S: DatagramSource + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let running = self.running.clone();
        let counters = self.counters.clone();

        let handle = thread::Builder::new()
            .name("udp-receiver".into())
            .spawn(move || {
                let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

                while running.load(Ordering::Relaxed) {
                    match source.recv_datagram(&mut buf) {
                        Ok(Some((len, _from))) => {
                            if !running.load(Ordering::Relaxed) {
                                break;
                            }
                            counters.datagrams.fetch_add(1, Ordering::Relaxed);
                            session.on_datagram_received(&buf[..len]);
                        }
                        Ok(None) => {
                            counters.timeouts.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            counters.socket_errors.fetch_add(1, Ordering::Relaxed);
                            if running.load(Ordering::Relaxed) {
                                tracing::error!("UDP receive error: {}", e);
                            }
                        }
                    }
                }

                tracing::debug!("Receive loop exited");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                NetworkError::SpawnFailed(e.to_string())
            })?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Signal the thread and wait for it to exit.
    ///
    /// Returns within roughly one socket receive timeout.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Check if the receive thread is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get statistics
    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            datagrams: self.counters.datagrams.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            socket_errors: self.counters.socket_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for AudioReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}
