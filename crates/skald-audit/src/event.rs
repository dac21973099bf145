//! Audit event model.
//!
//! Events are opaque structured documents with two mandatory fields: a
//! unique identifier (`_id`) and a timestamp. Everything else is carried
//! as-is and round-trips through serialization unchanged. Events are
//! immutable once offered to a handler.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// An audit event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    /// Unique event ID.
    #[serde(rename = "_id")]
    pub id: String,

    /// When the event occurred, RFC 3339 with millisecond precision.
    pub timestamp: String,

    /// Remaining event fields, carried opaquely.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AuditEvent {
    /// Create an event with a generated UUID and the current time.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Create an event with a caller-supplied identifier.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: format_timestamp(Utc::now()),
            fields: Map::new(),
        }
    }

    /// Create a builder for an audit event.
    pub fn builder() -> AuditEventBuilder {
        AuditEventBuilder::new()
    }

    /// Look up an arbitrary field by name (`_id` and `timestamp` included).
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "_id" => Some(Value::String(self.id.clone())),
            "timestamp" => Some(Value::String(self.timestamp.clone())),
            _ => self.fields.get(name).cloned(),
        }
    }
}

impl Default for AuditEvent {
    fn default() -> Self {
        Self::new()
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Builder for creating audit events.
#[derive(Debug)]
pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    /// Create a new builder with a generated ID and the current time.
    pub fn new() -> Self {
        Self {
            event: AuditEvent::new(),
        }
    }

    /// Set the event ID.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.event.id = id.into();
        self
    }

    /// Set the event timestamp.
    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.event.timestamp = format_timestamp(at);
        self
    }

    /// Set an arbitrary field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.event.fields.insert(name.into(), value.into());
        self
    }

    /// Build the audit event.
    pub fn build(self) -> AuditEvent {
        self.event
    }
}

impl Default for AuditEventBuilder {
    fn default() -> Self {
        Self::new()
    }
}
