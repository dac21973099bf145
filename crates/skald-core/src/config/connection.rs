//! Remote collector connection configuration.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Connection settings for the HTTP collector sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Collector base URL, e.g. `http://localhost:8088`.
    pub endpoint: String,

    /// Path the batch is posted to, relative to the endpoint.
    #[serde(default = "default_collector_path")]
    pub collector_path: String,

    /// Authorization scheme, e.g. `Bearer` or `Splunk`.
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,

    /// Authorization token.
    pub token: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_millis")]
    pub request_timeout_millis: u64,
}

impl ConnectionConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::Config(
                "connection.endpoint must not be empty".into(),
            ));
        }
        if self.token.is_empty() {
            return Err(ConfigError::Config(
                "connection.token must not be empty".into(),
            ));
        }
        if self.request_timeout_millis == 0 {
            return Err(ConfigError::Config(
                "connection.request_timeout_millis must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Full URL batches are posted to.
    pub fn collector_url(&self) -> String {
        format!(
            "{}{}",
            self.endpoint.trim_end_matches('/'),
            self.collector_path
        )
    }
}

fn default_collector_path() -> String {
    "/services/collector/raw".to_string()
}

fn default_auth_scheme() -> String {
    "Bearer".to_string()
}

fn default_request_timeout_millis() -> u64 {
    10_000
}
