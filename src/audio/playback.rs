//! Audio output: drives the session's pull contract
//!
//! The render side of the pipeline. An [`AudioOutput`] calls
//! [`StreamSession::render`] at a fixed cadence; the session always hands back
//! a full buffer, zero-padded on underrun.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::device::{default_output_device, output_device_by_name, select_output_config};
use crate::error::AudioError;
use crate::session::StreamSession;

/// How long `start()` waits for the device thread to report
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that pulls rendered audio from a session
pub trait AudioOutput: Send {
    /// Begin pulling. Must either be running or have released everything on error.
    fn start(&mut self, session: Arc<StreamSession>) -> Result<(), AudioError>;

    /// Stop pulling and release the device
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Take the next error the output reported while running, if any
    fn poll_error(&mut self) -> Option<AudioError> {
        None
    }
}

/// Playback through a cpal output device
pub struct AudioPlayback {
    /// Device name, `None` for the host default
    device_name: Option<String>,
    frames_per_buffer: u32,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Option<Receiver<AudioError>>,
    callbacks: Arc<AtomicU64>,
}

impl AudioPlayback {
    pub fn new(device_name: Option<String>, frames_per_buffer: u32) -> Self {
        Self {
            device_name,
            frames_per_buffer,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            error_rx: None,
            callbacks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of device callbacks served
    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    fn open_device(&self) -> Result<cpal::Device, AudioError> {
        match &self.device_name {
            Some(name) => output_device_by_name(name),
            None => default_output_device(),
        }
    }
}

impl AudioOutput for AudioPlayback {
    fn start(&mut self, session: Arc<StreamSession>) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }

        let device = self.open_device()?;
        let supported = select_output_config(&device, session.sample_rate())?;
        let sample_format = supported.sample_format();
        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(self.frames_per_buffer),
        };

        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        self.error_rx = Some(error_rx);

        let running = self.running.clone();
        let callbacks = self.callbacks.clone();
        let frames_per_buffer = self.frames_per_buffer as usize;
        let stream_config = config.clone();

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || {
                let open = |config: &StreamConfig| {
                    let err_fn = stream_error_reporter(error_tx.clone());
                    let session = session.clone();
                    let callbacks = callbacks.clone();

                    match sample_format {
                        cpal::SampleFormat::I16 => build_stream::<i16>(
                            &device, config, session, callbacks, frames_per_buffer, err_fn,
                        ),
                        cpal::SampleFormat::F32 => build_stream::<f32>(
                            &device, config, session, callbacks, frames_per_buffer, err_fn,
                        ),
                        other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
                    }
                };

                let stream = open(&stream_config).or_else(|e| {
                    tracing::warn!(
                        "Fixed buffer of {} frames rejected ({}), using device default",
                        frames_per_buffer,
                        e
                    );
                    open(&StreamConfig {
                        buffer_size: cpal::BufferSize::Default,
                        ..stream_config.clone()
                    })
                });

                let stream = match stream.and_then(|s| {
                    s.play()
                        .map(|_| s)
                        .map_err(|e| AudioError::StreamError(e.to_string()))
                }) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let _ = ready_tx.send(Ok(()));

                // Keep thread alive while running
                while running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }

                drop(stream);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                AudioError::StreamError(e.to_string())
            })?;

        self.thread_handle = Some(handle);

        let outcome = ready_rx
            .recv_timeout(STARTUP_TIMEOUT)
            .unwrap_or_else(|_| Err(AudioError::StreamError("device start timed out".into())));

        match outcome {
            Ok(()) => {
                tracing::info!(
                    "Audio playback started ({} Hz, {} channel(s), {:?}, {} frames/buffer)",
                    config.sample_rate.0,
                    config.channels,
                    sample_format,
                    self.frames_per_buffer
                );
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::info!("Audio playback stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn poll_error(&mut self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Driver error callback: log, then queue for `poll_error`.
///
/// The queue is bounded; once full, further errors are only logged.
fn stream_error_reporter(
    error_tx: Sender<AudioError>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err: cpal::StreamError| {
        tracing::error!("Audio output stream error: {}", err);
        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    session: Arc<StreamSession>,
    callbacks: Arc<AtomicU64>,
    frames_per_buffer: usize,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<i16>,
{
    let channels = config.channels as usize;
    // Sized up front; only grows if the driver ignores the fixed buffer size
    let mut scratch = vec![0i16; frames_per_buffer];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                if scratch.len() < frames {
                    scratch.resize(frames, 0);
                }
                let mono = &mut scratch[..frames];
                session.render(mono);

                for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                    frame.fill(T::from_sample(sample));
                }
                callbacks.fetch_add(1, Ordering::Relaxed);
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))
}

/// Clock-driven output for hosts without a sound device.
///
/// Pulls `frames_per_buffer` samples every `frames_per_buffer / sample_rate`
/// seconds and discards them, just like a device callback would consume them.
pub struct HeadlessOutput {
    frames_per_buffer: usize,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
}

impl HeadlessOutput {
    pub fn new(frames_per_buffer: usize) -> Self {
        Self {
            frames_per_buffer,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Render ticks performed so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl AudioOutput for HeadlessOutput {
    fn start(&mut self, session: Arc<StreamSession>) -> Result<(), AudioError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }

        let period = Duration::from_secs_f64(
            self.frames_per_buffer as f64 / session.sample_rate() as f64,
        );
        let running = self.running.clone();
        let ticks = self.ticks.clone();
        let mut out = vec![0i16; self.frames_per_buffer];

        let handle = thread::Builder::new()
            .name("headless-render".into())
            .spawn(move || {
                let mut deadline = Instant::now();
                while running.load(Ordering::Relaxed) {
                    session.render(&mut out);
                    ticks.fetch_add(1, Ordering::Relaxed);

                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else {
                        deadline = now;
                    }
                }
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                AudioError::StreamError(e.to_string())
            })?;

        self.thread_handle = Some(handle);
        tracing::info!(
            "Headless output started ({} frames every {:?})",
            self.frames_per_buffer,
            period
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for HeadlessOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PacketEncoder;
    use crate::session::SessionConfig;

    fn session() -> Arc<StreamSession> {
        Arc::new(StreamSession::new(SessionConfig {
            sample_rate: 16000,
            buffer_capacity: 16000,
        }))
    }

    #[test]
    fn test_headless_drains_buffer() {
        let session = session();
        session.on_datagram_received(&PacketEncoder::encode(0, 0, &[1; 512]));

        let mut output = HeadlessOutput::new(256);
        output.start(session.clone()).unwrap();
        assert!(output.is_running());

        let start = Instant::now();
        while session.buffered_samples() > 0 && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        output.stop();

        assert!(!output.is_running());
        assert_eq!(session.buffered_samples(), 0);
        assert!(output.ticks() >= 2);
    }

    #[test]
    fn test_headless_double_start() {
        let session = session();
        let mut output = HeadlessOutput::new(128);
        output.start(session.clone()).unwrap();
        assert!(matches!(
            output.start(session),
            Err(AudioError::AlreadyRunning)
        ));
        output.stop();
    }

    #[test]
    fn test_stream_errors_are_polled() {
        let (tx, rx) = bounded(2);
        let mut playback = AudioPlayback::new(None, 256);
        playback.error_rx = Some(rx);
        assert!(playback.poll_error().is_none());

        let mut report = stream_error_reporter(tx);
        report(cpal::StreamError::DeviceNotAvailable);
        report(cpal::StreamError::DeviceNotAvailable);
        report(cpal::StreamError::DeviceNotAvailable);

        assert!(matches!(
            playback.poll_error(),
            Some(AudioError::StreamError(_))
        ));
        assert!(playback.poll_error().is_some());
        assert!(playback.poll_error().is_none());
    }

    #[test]
    fn test_headless_reports_no_errors() {
        let mut output = HeadlessOutput::new(64);
        assert!(output.poll_error().is_none());
    }

    #[test]
    fn test_playback_unknown_device_fails_cleanly() {
        let mut playback = AudioPlayback::new(Some("no-such-device-4f1c".into()), 256);
        assert!(playback.start(session()).is_err());
        assert!(!playback.is_running());
        assert_eq!(playback.callbacks(), 0);
    }
}
