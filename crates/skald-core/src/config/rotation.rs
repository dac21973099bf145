//! File rotation configuration.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Configuration for size-triggered log file rotation.
///
/// Rotation can be enabled with `max_file_size = 0`, in which case no
/// size policy applies and files rotate only on the explicit `rotate`
/// action.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileRotationConfig {
    /// Whether rotation is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Size threshold in bytes. `0` disables the size policy.
    #[serde(default)]
    pub max_file_size: u64,
}

impl FileRotationConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        // No constraints beyond the type: max_file_size == 0 means
        // on-demand rotation only.
        let _ = self;
        Ok(())
    }
}
