// Configuration types shared across all Skald crates
pub mod config;

// Re-export commonly used config types for convenience
pub use config::{
    BufferingConfig,
    ConfigError,
    ConnectionConfig,
    FileRotationConfig,
    HandlerConfig,
    SigningConfig,
    SinkBackend,
};
