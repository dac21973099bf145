//! Error types for the audit delivery engine.

use thiserror::Error;

/// Errors that can occur during audit event delivery.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The topic's queue is full; the event was rejected.
    #[error("audit queue for topic '{topic}' is full, event {event_id} rejected")]
    QueueFull { topic: String, event_id: String },

    /// A batch could not be delivered to the sink.
    #[error("sink failure: {0}")]
    SinkFailure(String),

    /// The requested event was not found.
    #[error("event not found with ID: {0}")]
    NotFound(String),

    /// The operation is not supported by the configured sink.
    #[error("operation not supported: {0}")]
    UnsupportedOperation(String),

    /// The topic is not declared on this handler.
    #[error("topic not found: {0}")]
    UnknownTopic(String),

    /// The action was addressed to a different handler.
    #[error("action targets handler '{target}', this handler is '{name}'")]
    WrongTargetHandler { target: String, name: String },

    /// The action name is not recognized.
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    /// The handler has not been started, or has already shut down.
    #[error("handler is not in the started state")]
    NotStarted,

    /// `startup` was called twice.
    #[error("handler is already started")]
    AlreadyStarted,

    /// An in-flight flush did not complete within the shutdown grace period.
    #[error("shutdown timed out waiting for topic '{0}' to flush")]
    ShutdownTimeout(String),

    /// A signature in the chain did not verify.
    #[error("signature chain mismatch at offset {offset}")]
    SignatureMismatch { offset: u64 },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] skald_core::ConfigError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
