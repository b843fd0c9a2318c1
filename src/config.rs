//! Receiver configuration
//!
//! Loaded from a TOML file (by default in the platform config directory) and
//! then overridden by command-line flags.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::session::SessionConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub audio: AudioConfig,
    pub recording: RecordingConfig,
    pub ui: UiConfig,
}

/// UDP transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: IpAddr,
    pub udp_port: u16,
    /// Upper bound on a single blocking receive, so the loop can observe stop
    pub recv_timeout_ms: u64,
    /// Kernel receive buffer (SO_RCVBUF), 0 keeps the OS default
    pub recv_buffer_size: usize,
}

impl NetworkConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.udp_port)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            udp_port: DEFAULT_UDP_PORT,
            recv_timeout_ms: DEFAULT_RECV_TIMEOUT_MS,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

/// Playback settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Frames requested per device callback
    pub frames_per_buffer: u32,
    /// Jitter buffer length in seconds of audio
    pub jitter_buffer_secs: f32,
    /// Output device name, default device when unset
    pub output_device: Option<String>,
    /// Render on a timer instead of a sound device
    pub headless: bool,
}

impl AudioConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::with_buffer_duration(self.sample_rate, self.jitter_buffer_secs)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frames_per_buffer: DEFAULT_FRAMES_PER_BUFFER,
            jitter_buffer_secs: DEFAULT_JITTER_BUFFER_SECS,
            output_device: None,
            headless: false,
        }
    }
}

/// WAV persistence settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecordingConfig {
    pub save_file: Option<PathBuf>,
}

/// Statistics HTTP endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub enabled: bool,
    pub bind_address: IpAddr,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl AppConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "udp-audio-receiver")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from the default path, falling back to defaults if absent
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Write as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Reject settings the receiver cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.network.udp_port == 0 {
            return Err(Error::Config("Port must be between 1 and 65535".into()));
        }
        if self.network.recv_timeout_ms == 0 {
            return Err(Error::Config("Receive timeout must be positive".into()));
        }
        if self.audio.sample_rate == 0 || self.audio.sample_rate > MAX_SAMPLE_RATE {
            return Err(Error::Config(format!(
                "Sample rate must be between 1 and {} Hz",
                MAX_SAMPLE_RATE
            )));
        }
        if self.audio.frames_per_buffer == 0 {
            return Err(Error::Config("Frames per buffer must be positive".into()));
        }
        let secs = self.audio.jitter_buffer_secs;
        if !secs.is_finite() || secs <= 0.0 || secs > MAX_JITTER_BUFFER_SECS {
            return Err(Error::Config(format!(
                "Jitter buffer length must be between 0 and {} seconds",
                MAX_JITTER_BUFFER_SECS
            )));
        }
        if self.ui.enabled && self.ui.http_port == 0 {
            return Err(Error::Config("HTTP port must be between 1 and 65535".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.network.udp_port, 5000);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.session_config().buffer_capacity, 48000);
        assert_eq!(config.network.recv_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.network.udp_port = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = AppConfig::default();
        config.audio.sample_rate = 0;
        assert!(config.validate().is_err());

        for secs in [f32::NAN, f32::INFINITY, 0.0, -1.0, 1.0e30, 60.5] {
            let mut config = AppConfig::default();
            config.audio.jitter_buffer_secs = secs;
            assert!(
                matches!(config.validate(), Err(Error::Config(_))),
                "accepted {} s",
                secs
            );
        }

        let mut config = AppConfig::default();
        config.audio.jitter_buffer_secs = 60.0;
        config.audio.sample_rate = 48000;
        config.validate().unwrap();

        let mut config = AppConfig::default();
        config.audio.sample_rate = u32::MAX;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = AppConfig::default();
        config.network.udp_port = 9000;
        config.audio.output_device = Some("Speakers".into());
        config.recording.save_file = Some(PathBuf::from("out.wav"));
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str("[audio]\nsample_rate = 44100\n").unwrap();
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.audio.frames_per_buffer, 256);
        assert_eq!(config.network, NetworkConfig::default());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[network\nudp_port = 1").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(Error::Config(_))));
    }
}
