use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{StreamConfig, DEFAULT_CHANNEL_CAPACITY};
use crate::handshake::HandshakeTiming;
use crate::protocol::{Credentials, DEFAULT_PORT};

/// Environment variable holding the camera username
pub const USERNAME_ENV: &str = "CAM_USERNAME";
/// Environment variable holding the camera password
pub const PASSWORD_ENV: &str = "CAM_PASSWORD";

/// Handshake delays, in milliseconds from connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    #[serde(default = "default_auth_delay_ms")]
    pub auth_delay_ms: u64,
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,
}

fn default_auth_delay_ms() -> u64 {
    50
}

fn default_start_delay_ms() -> u64 {
    100
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            auth_delay_ms: default_auth_delay_ms(),
            start_delay_ms: default_start_delay_ms(),
        }
    }
}

impl From<HandshakeConfig> for HandshakeTiming {
    fn from(config: HandshakeConfig) -> Self {
        HandshakeTiming {
            auth_delay: Duration::from_millis(config.auth_delay_ms),
            start_delay: Duration::from_millis(config.start_delay_ms),
        }
    }
}

/// Configuration for a single Bubble camera
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Unique name for the camera (used in log lines and output naming)
    pub name: String,
    /// Camera IP or hostname
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub channel: u32,
    #[serde(default)]
    pub stream: u32,
    /// Annex-B output file or FIFO (e.g. read by a transcoder)
    #[serde(default)]
    pub output: Option<PathBuf>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// List of cameras to stream
    pub cameras: Vec<CameraConfig>,
    #[serde(default)]
    pub handshake: HandshakeConfig,
    /// Fail a connection once this many bytes wait for a start code (unbounded if unset)
    #[serde(default)]
    pub max_pending_bytes: Option<usize>,
    /// Units buffered between socket and consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for camera in &self.cameras {
            if camera.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "camera name must not be empty".to_string(),
                ));
            }
            if camera.host.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "camera '{}' has no host",
                    camera.name
                )));
            }
            if !names.insert(camera.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate camera name '{}'",
                    camera.name
                )));
            }
        }
        if self.handshake.start_delay_ms < self.handshake.auth_delay_ms {
            return Err(ConfigError::ValidationError(
                "start_delay_ms must not be smaller than auth_delay_ms".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Connection settings for one camera
    pub fn stream_config(&self, camera: &CameraConfig, credentials: &Credentials) -> StreamConfig {
        StreamConfig {
            name: camera.name.clone(),
            host: camera.host.clone(),
            port: camera.port,
            channel: camera.channel,
            stream: camera.stream,
            credentials: credentials.clone(),
            timing: self.handshake.into(),
            max_pending_bytes: self.max_pending_bytes,
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Read camera credentials from `CAM_USERNAME` / `CAM_PASSWORD`
pub fn credentials_from_env() -> Result<Credentials, ConfigError> {
    credentials_from_vars(
        std::env::var(USERNAME_ENV).ok(),
        std::env::var(PASSWORD_ENV).ok(),
    )
}

/// Build credentials, rejecting missing or empty values
pub fn credentials_from_vars(
    username: Option<String>,
    password: Option<String>,
) -> Result<Credentials, ConfigError> {
    match (username, password) {
        (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Ok(Credentials::new(u, p)),
        _ => Err(ConfigError::MissingCredentials),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CAM_USERNAME or CAM_PASSWORD missing")]
    MissingCredentials,
}
