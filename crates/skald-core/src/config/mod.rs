//! Configuration types for the Skald audit event service.
//!
//! A handler is configured from a YAML file (or inline YAML) and validated
//! before startup. Validation failures are fatal: a handler built from an
//! invalid configuration never reaches the started state.
//!
//! # Configuration Files
//!
//! - **handler.yaml**: One handler definition with sink backend, topics,
//!   buffering, rotation and signing settings.

pub mod buffering;
pub mod connection;
pub mod rotation;
pub mod signing;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use buffering::BufferingConfig;
pub use connection::ConnectionConfig;
pub use rotation::FileRotationConfig;
pub use signing::SigningConfig;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Sink backend selected at handler construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkBackend {
    /// One JSON object per line, appended to a per-topic file.
    #[default]
    Json,
    /// One delimited row per line, appended to a per-topic file.
    Csv,
    /// Batches posted to a remote HTTP collector (write-only).
    Http,
}

impl SinkBackend {
    /// Whether this backend writes to local files.
    pub fn is_file_based(self) -> bool {
        matches!(self, Self::Json | Self::Csv)
    }
}

/// Complete configuration for one audit event handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Handler name, used to address actions when several handlers share
    /// a topic namespace.
    pub name: String,

    /// Whether the handler is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Topics this handler accepts. Fixed for the handler's lifetime.
    #[serde(default)]
    pub topics: Vec<String>,

    /// Sink backend.
    #[serde(default)]
    pub backend: SinkBackend,

    /// Directory holding per-topic log files (file backends only).
    #[serde(default)]
    pub log_directory: Option<PathBuf>,

    /// Event buffering settings.
    #[serde(default)]
    pub buffering: BufferingConfig,

    /// File rotation settings (file backends only).
    #[serde(default)]
    pub file_rotation: FileRotationConfig,

    /// Tamper-evident signing settings (file backends only).
    #[serde(default)]
    pub signing: SigningConfig,

    /// Remote collector connection (HTTP backend only).
    #[serde(default)]
    pub connection: Option<ConnectionConfig>,

    /// How long shutdown waits for the final flush before giving up.
    #[serde(default = "default_shutdown_grace_millis")]
    pub shutdown_grace_millis: u64,
}

impl HandlerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Validate the configuration. Errors here are fatal to startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Config("handler name must not be empty".into()));
        }
        if self.topics.is_empty() {
            return Err(ConfigError::Config(
                "at least one topic must be declared".into(),
            ));
        }
        self.buffering.validate()?;

        match self.backend {
            SinkBackend::Json | SinkBackend::Csv => {
                if self.log_directory.is_none() {
                    return Err(ConfigError::Config(
                        "file backends require log_directory".into(),
                    ));
                }
                if self.file_rotation.enabled {
                    self.file_rotation.validate()?;
                }
                if self.signing.enabled {
                    self.signing.validate()?;
                }
            }
            SinkBackend::Http => {
                let connection = self.connection.as_ref().ok_or_else(|| {
                    ConfigError::Config("http backend requires a connection section".into())
                })?;
                connection.validate()?;
                if self.file_rotation.enabled {
                    return Err(ConfigError::Config(
                        "file rotation is not supported by the http backend".into(),
                    ));
                }
                if self.signing.enabled {
                    return Err(ConfigError::Config(
                        "signing is not supported by the http backend".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Whether the named topic is handled by this handler.
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_shutdown_grace_millis() -> u64 {
    5_000
}
