//! Sink variants.
//!
//! Sinks form a closed set selected at handler construction: the two
//! file formats share `FileSink`, and the HTTP collector is write-only.
//! Every variant consumes whole batches and reports success or failure
//! for the batch as a unit.

use std::path::Path;

use serde_json::Value;

use crate::batch::Batch;
use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::file::FileSink;
use crate::format::RecordFormat;
use crate::http::HttpBatchSink;

/// A destination for assembled batches.
pub enum EventSink {
    File(FileSink),
    Http(HttpBatchSink),
}

impl EventSink {
    /// Render one event to its queued wire form for this sink.
    ///
    /// File sinks render the record format directly; the HTTP sink
    /// injects a `_topic` field so the collector can attribute events
    /// from the concatenated body.
    pub fn render_record(&self, topic: &str, event: &AuditEvent) -> Result<String, AuditError> {
        match self {
            Self::File(file) => file.format().render_event(event),
            Self::Http(_) => {
                let mut value = serde_json::to_value(event)?;
                if let Value::Object(map) = &mut value {
                    map.insert("_topic".to_string(), Value::String(topic.to_string()));
                }
                Ok(serde_json::to_string(&value)?)
            }
        }
    }

    /// Durably persist or forward one batch.
    pub async fn write_batch(&self, batch: &Batch) -> Result<(), AuditError> {
        match self {
            Self::File(file) => file.write_batch(batch).await,
            Self::Http(http) => http.write_batch(batch).await,
        }
    }

    /// Current file path, for the read path. `None` for write-only sinks.
    pub fn current_path(&self) -> Option<&Path> {
        match self {
            Self::File(file) => Some(file.current_path()),
            Self::Http(_) => None,
        }
    }

    /// Record format, for the read path. `None` for write-only sinks.
    pub fn format(&self) -> Option<RecordFormat> {
        match self {
            Self::File(file) => Some(file.format()),
            Self::Http(_) => None,
        }
    }

    /// Force a rotation. Unsupported for write-only sinks and when
    /// rotation is disabled.
    pub async fn rotate(&self) -> Result<(), AuditError> {
        match self {
            Self::File(file) => file.rotate().await.map(|_| ()),
            Self::Http(_) => Err(AuditError::UnsupportedOperation(
                "rotation is not supported by the http sink".into(),
            )),
        }
    }

    /// Append a chain signature if signing is configured.
    pub async fn sign_now(&self) -> Result<(), AuditError> {
        match self {
            Self::File(file) => file.sign_now().await.map(|_| ()),
            Self::Http(_) => Ok(()),
        }
    }

    /// Flush file buffers to disk. No-op for the http sink.
    pub async fn flush(&self) -> Result<(), AuditError> {
        match self {
            Self::File(file) => file.flush().await,
            Self::Http(_) => Ok(()),
        }
    }

    /// Final flush plus closing signature, at shutdown.
    pub async fn close(&self) -> Result<(), AuditError> {
        match self {
            Self::File(file) => file.close().await,
            Self::Http(_) => Ok(()),
        }
    }
}
