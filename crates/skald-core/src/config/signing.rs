//! Tamper-evident signing configuration.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Configuration for the periodic signature chain over log files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Whether signing is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Interval between signatures, in milliseconds.
    #[serde(default = "default_signature_interval_millis")]
    pub signature_interval_millis: u64,

    /// Key material as a 64-character hex string (32 bytes).
    #[serde(default)]
    pub key: Option<String>,
}

impl SigningConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.signature_interval_millis == 0 {
            return Err(ConfigError::Config(
                "signing.signature_interval_millis must be > 0".into(),
            ));
        }
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| ConfigError::Config("signing requires key material".into()))?;
        let bytes = hex::decode(key)
            .map_err(|e| ConfigError::Config(format!("signing.key is not valid hex: {e}")))?;
        if bytes.len() != 32 {
            return Err(ConfigError::Config(format!(
                "signing.key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(())
    }

    /// Decode the configured key material. Assumes `validate` passed.
    pub fn key_bytes(&self) -> Result<[u8; 32], ConfigError> {
        self.validate()?;
        let bytes = hex::decode(self.key.as_deref().unwrap_or_default())
            .map_err(|e| ConfigError::Config(format!("signing.key is not valid hex: {e}")))?;
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(key)
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            signature_interval_millis: default_signature_interval_millis(),
            key: None,
        }
    }
}

fn default_signature_interval_millis() -> u64 {
    60_000
}
