//! WAV file persistence
//!
//! Receives the same blocks that are pushed into the jitter buffer and writes
//! them to a mono 16-bit PCM WAV file on a dedicated thread. The receive path
//! only ever does a non-blocking channel send, so a slow disk or a failed
//! write can never stall playback.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::AudioError;

/// RIFF header length for a plain PCM file
pub const WAV_HEADER_SIZE: u64 = 44;

/// Blocks queued between the receive thread and the writer
const QUEUE_DEPTH: usize = 1024;

/// Consumer of decoded sample blocks
pub trait SampleSink: Send + Sync {
    /// Take a copy of `samples`. Must not block.
    fn accept(&self, samples: &[i16]);
}

/// Result of a finished recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSummary {
    pub samples_written: u64,
    pub blocks_dropped: u64,
}

/// Background WAV writer
pub struct WavRecorder {
    path: PathBuf,
    tx: Sender<Vec<i16>>,
    stop: Arc<AtomicBool>,
    /// Cleared by the writer thread when it gives up
    alive: Arc<AtomicBool>,
    samples_written: Arc<AtomicU64>,
    blocks_dropped: AtomicU64,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WavRecorder {
    /// Create `path`, write a provisional header and start the writer thread
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self, AudioError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .map_err(|e| AudioError::Recorder(format!("{}: {}", path.display(), e)))?;
        let mut writer = BufWriter::new(file);
        write_header(&mut writer, sample_rate, 0)
            .map_err(|e| AudioError::Recorder(e.to_string()))?;

        let (tx, rx) = bounded::<Vec<i16>>(QUEUE_DEPTH);
        let stop = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let samples_written = Arc::new(AtomicU64::new(0));

        let handle = {
            let stop = stop.clone();
            let alive = alive.clone();
            let samples_written = samples_written.clone();
            let path = path.clone();
            thread::Builder::new()
                .name("wav-writer".into())
                .spawn(move || {
                    if let Err(e) =
                        writer_loop(writer, rx, sample_rate, &stop, &samples_written)
                    {
                        tracing::error!("Recording to {} failed: {}", path.display(), e);
                    }
                    alive.store(false, Ordering::Release);
                })
                .map_err(|e| AudioError::Recorder(e.to_string()))?
        };

        tracing::info!("Saving audio to: {}", path.display());

        Ok(Self {
            path,
            tx,
            stop,
            alive,
            samples_written,
            blocks_dropped: AtomicU64::new(0),
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Drain pending blocks, patch the header sizes and close the file
    pub fn finish(&self) -> WavSummary {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
            tracing::info!(
                "WAV file finalized: {} samples written to {}",
                self.samples_written.load(Ordering::Relaxed),
                self.path.display()
            );
        }
        self.summary()
    }

    pub fn summary(&self) -> WavSummary {
        WavSummary {
            samples_written: self.samples_written.load(Ordering::Relaxed),
            blocks_dropped: self.blocks_dropped.load(Ordering::Relaxed),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the writer thread is still accepting blocks
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.stop.load(Ordering::Acquire)
    }
}

impl SampleSink for WavRecorder {
    fn accept(&self, samples: &[i16]) {
        if !self.is_alive() {
            self.blocks_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match self.tx.try_send(samples.to_vec()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                let dropped = self.blocks_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    tracing::warn!("Recorder queue unavailable, {} blocks dropped", dropped);
                }
            }
        }
    }
}

impl Drop for WavRecorder {
    fn drop(&mut self) {
        self.finish();
    }
}

fn writer_loop(
    mut writer: BufWriter<File>,
    rx: Receiver<Vec<i16>>,
    sample_rate: u32,
    stop: &AtomicBool,
    samples_written: &AtomicU64,
) -> io::Result<()> {
    let mut bytes = Vec::new();
    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(block) => {
                bytes.clear();
                bytes.extend(block.iter().flat_map(|s| s.to_le_bytes()));
                writer.write_all(&bytes)?;
                samples_written.fetch_add(block.len() as u64, Ordering::Relaxed);
            }
            Err(_) if stop.load(Ordering::Acquire) && rx.is_empty() => break,
            Err(_) => {}
        }
    }

    let data_len = samples_written.load(Ordering::Relaxed) * 2;
    writer.seek(SeekFrom::Start(0))?;
    write_header(&mut writer, sample_rate, data_len)?;
    writer.flush()
}

/// Write a canonical 44-byte mono 16-bit PCM header
fn write_header<W: Write>(writer: &mut W, sample_rate: u32, data_len: u64) -> io::Result<()> {
    let data_len = u32::try_from(data_len).unwrap_or(u32::MAX - 36);
    let channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * block_align as u32;

    writer.write_all(b"RIFF")?;
    writer.write_all(&(data_len + 36).to_le_bytes())?;
    writer.write_all(b"WAVE")?;
    writer.write_all(b"fmt ")?;
    writer.write_all(&16u32.to_le_bytes())?;
    writer.write_all(&1u16.to_le_bytes())?; // PCM
    writer.write_all(&channels.to_le_bytes())?;
    writer.write_all(&sample_rate.to_le_bytes())?;
    writer.write_all(&byte_rate.to_le_bytes())?;
    writer.write_all(&block_align.to_le_bytes())?;
    writer.write_all(&bits_per_sample.to_le_bytes())?;
    writer.write_all(b"data")?;
    writer.write_all(&data_len.to_le_bytes())
}
