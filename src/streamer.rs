//! Receiver lifecycle
//!
//! Startup order: audio output, then socket, then receive thread. The output
//! must already be draining before anything is pushed. A failure at any step
//! tears down what was started before it and returns the error.
//!
//! Shutdown order: stop and join the receive thread, take the final
//! statistics, finish the recording, stop the output, discard buffered audio.
//!
//! A streamer runs once. Starting it twice, or again after `stop()`, is an error.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::audio::playback::{AudioOutput, AudioPlayback, HeadlessOutput};
use crate::audio::wav::WavRecorder;
use crate::config::AppConfig;
use crate::error::{AudioError, Error, Result};
use crate::network::receiver::{AudioReceiver, ReceiverStats};
use crate::network::udp::{create_socket, DatagramSource};
use crate::session::{StatisticsSnapshot, StreamSession};

/// Owns every moving part of one receiving stream
pub struct UdpAudioStreamer {
    config: AppConfig,
    session: Arc<StreamSession>,
    recorder: Option<Arc<WavRecorder>>,
    output: Option<Box<dyn AudioOutput>>,
    receiver: AudioReceiver,
    local_addr: Option<SocketAddr>,
    final_stats: Option<StatisticsSnapshot>,
}

impl UdpAudioStreamer {
    /// Validate the configuration and build the session.
    ///
    /// Opens the recording file if one is configured; nothing else is started.
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let recorder = match &config.recording.save_file {
            Some(path) => Some(Arc::new(WavRecorder::create(path, config.audio.sample_rate)?)),
            None => None,
        };

        let mut session = StreamSession::new(config.audio.session_config());
        if let Some(recorder) = &recorder {
            session = session.with_sink(recorder.clone());
        }

        Ok(Self {
            config,
            session: Arc::new(session),
            recorder,
            output: None,
            receiver: AudioReceiver::new(),
            local_addr: None,
            final_stats: None,
        })
    }

    /// Start with the configured output and a socket bound per the config
    pub fn start(&mut self) -> Result<()> {
        self.ensure_startable()?;

        let output: Box<dyn AudioOutput> = if self.config.audio.headless {
            Box::new(HeadlessOutput::new(self.config.audio.frames_per_buffer as usize))
        } else {
            Box::new(AudioPlayback::new(
                self.config.audio.output_device.clone(),
                self.config.audio.frames_per_buffer,
            ))
        };

        let config = self.config.clone();
        self.start_with(output, move || open_udp_source(&config))
    }

    /// Start with an explicit output and datagram source factory.
    ///
    /// The factory runs only after the output is running.
    pub fn start_with<S, F>(&mut self, mut output: Box<dyn AudioOutput>, open_source: F) -> Result<()>
    where
        S: DatagramSource + 'static,
        F: FnOnce() -> Result<(S, SocketAddr)>,
    {
        self.ensure_startable()?;

        output.start(self.session.clone())?;
        self.output = Some(output);

        let (source, local_addr) = match open_source() {
            Ok(opened) => opened,
            Err(e) => {
                tracing::error!("Failed to initialize UDP socket: {}", e);
                self.stop_output();
                return Err(e);
            }
        };

        if let Err(e) = self.receiver.start(source, self.session.clone()) {
            self.stop_output();
            return Err(e.into());
        }

        self.local_addr = Some(local_addr);

        tracing::info!("UDP audio receiver listening on {}", local_addr);
        tracing::info!("Sample rate: {} Hz", self.session.sample_rate());
        tracing::info!("Frame format: [2-byte seq#][4-byte sample timestamp][audio samples]");

        Ok(())
    }

    /// Stop everything in order and return the final statistics.
    ///
    /// Safe to call more than once; later calls return the same snapshot.
    pub fn stop(&mut self) -> StatisticsSnapshot {
        if let Some(stats) = &self.final_stats {
            return stats.clone();
        }

        self.receiver.stop();

        let stats = self.session.statistics_snapshot();
        if stats.packets_received > 0 {
            tracing::info!(
                "Packet statistics: {} received, {} dropped, {} out of order, drop rate {:.2}%",
                stats.packets_received,
                stats.packets_dropped,
                stats.packets_out_of_order,
                stats.drop_rate_percent()
            );
        }

        if let Some(recorder) = &self.recorder {
            let summary = recorder.finish();
            if summary.blocks_dropped > 0 {
                tracing::warn!("Recorder dropped {} blocks", summary.blocks_dropped);
            }
        }

        self.stop_output();
        self.session.close();

        if self.local_addr.take().is_some() {
            tracing::info!("UDP audio receiver stopped");
        }

        self.final_stats = Some(stats.clone());
        stats
    }

    fn ensure_startable(&self) -> Result<()> {
        if self.final_stats.is_some() {
            return Err(Error::Stopped);
        }
        if self.output.is_some() || self.receiver.is_running() {
            return Err(Error::AlreadyRunning);
        }
        Ok(())
    }

    fn stop_output(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.stop();
        }
    }

    /// Take the next runtime error reported by the audio output
    pub fn poll_output_error(&mut self) -> Option<AudioError> {
        self.output.as_mut().and_then(|output| output.poll_error())
    }

    /// Check if the receive thread is running
    pub fn is_running(&self) -> bool {
        self.receiver.is_running()
    }

    /// Address the socket is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn session(&self) -> &Arc<StreamSession> {
        &self.session
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn receiver_stats(&self) -> ReceiverStats {
        self.receiver.stats()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.session.statistics_snapshot()
    }
}

impl Drop for UdpAudioStreamer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bind a plain socket the way [`UdpAudioStreamer::start`] does
pub fn open_udp_source(config: &AppConfig) -> Result<(UdpSocket, SocketAddr)> {
    let socket = create_socket(
        config.network.bind_addr(),
        config.network.recv_timeout(),
        config.network.recv_buffer_size,
    )?;
    let local = socket.local_addr()?;
    Ok((socket, local))
}
