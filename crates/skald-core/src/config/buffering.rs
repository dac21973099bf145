//! Event buffering configuration.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Configuration for the in-memory event buffer and flush policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferingConfig {
    /// Whether buffering is enabled. When disabled, publish writes
    /// through to the sink synchronously.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Whether crossing the batch high-water mark wakes the flush task
    /// immediately instead of waiting for the write interval.
    #[serde(default = "default_enabled")]
    pub auto_flush: bool,

    /// Maximum number of queued events per topic. Offers beyond this
    /// are rejected.
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Maximum events assembled into one batch.
    #[serde(default = "default_max_batch_events")]
    pub max_batch_events: usize,

    /// Maximum cumulative payload bytes per batch.
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,

    /// Interval between scheduled flushes, in milliseconds.
    #[serde(default = "default_write_interval_millis")]
    pub write_interval_millis: u64,

    /// Size hint used to pre-allocate payload buffers.
    #[serde(default = "default_average_per_event_payload_size")]
    pub average_per_event_payload_size: usize,

    /// How many times a failed batch write is retried before the batch
    /// is reported as a terminal failure.
    #[serde(default = "default_max_flush_retries")]
    pub max_flush_retries: u32,

    /// Delay between retries, in milliseconds.
    #[serde(default = "default_retry_interval_millis")]
    pub retry_interval_millis: u64,
}

impl BufferingConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::Config("buffering.max_size must be > 0".into()));
        }
        if self.max_batch_events == 0 {
            return Err(ConfigError::Config(
                "buffering.max_batch_events must be > 0".into(),
            ));
        }
        if self.max_batch_bytes == 0 {
            return Err(ConfigError::Config(
                "buffering.max_batch_bytes must be > 0".into(),
            ));
        }
        if self.write_interval_millis == 0 {
            return Err(ConfigError::Config(
                "buffering.write_interval_millis must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Byte capacity of the queue, derived from the per-event size hint.
    pub fn capacity_bytes(&self) -> usize {
        self.max_size.saturating_mul(self.average_per_event_payload_size)
    }
}

impl Default for BufferingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            auto_flush: default_enabled(),
            max_size: default_max_size(),
            max_batch_events: default_max_batch_events(),
            max_batch_bytes: default_max_batch_bytes(),
            write_interval_millis: default_write_interval_millis(),
            average_per_event_payload_size: default_average_per_event_payload_size(),
            max_flush_retries: default_max_flush_retries(),
            retry_interval_millis: default_retry_interval_millis(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_size() -> usize {
    5_000
}

fn default_max_batch_events() -> usize {
    100
}

fn default_max_batch_bytes() -> usize {
    1024 * 1024
}

fn default_write_interval_millis() -> u64 {
    100
}

fn default_average_per_event_payload_size() -> usize {
    1_280
}

fn default_max_flush_retries() -> u32 {
    3
}

fn default_retry_interval_millis() -> u64 {
    100
}
