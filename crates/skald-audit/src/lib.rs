//! # skald-audit
//!
//! Buffered batch delivery of audit events.
//!
//! This crate provides functionality for:
//! - Publishing audit events to named topics with bounded buffering
//! - Draining buffers in the background on size, count and time triggers
//! - Appending events to per-topic files (JSON Lines or CSV) with
//!   size-based rotation and a tamper-evident signature chain
//! - Forwarding batches to a remote HTTP collector
//! - Reading events back by id or by predicate-filtered scan
//!
//! ## Delivery Model
//!
//! Each topic owns a bounded in-memory queue and one background flush
//! task, so at most one flush is in flight per topic and events reach
//! the sink in publish order. `publish` fails fast when the buffer is
//! full instead of blocking the caller.
//!
//! ## Sinks
//!
//! | Backend | Description |
//! |---------|-------------|
//! | `json`  | Newline-delimited JSON file per topic |
//! | `csv`   | CSV file per topic, fixed column set |
//! | `http`  | Batch POST to a collector endpoint |
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use skald_audit::{AuditEvent, AuditEventHandler};
//! use skald_core::HandlerConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HandlerConfig::from_file("handler.yaml")?;
//! let handler = AuditEventHandler::new(config)?;
//! handler.startup().await?;
//!
//! let event = AuditEvent::builder()
//!     .field("eventName", "AM-ACCESS-ATTEMPT")
//!     .field("result", "SUCCESSFUL")
//!     .build();
//! let id = handler.publish("access", event).await?;
//!
//! let stored = handler.read_event("access", &id).await?;
//! assert_eq!(stored.id, id);
//!
//! handler.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod error;
pub mod event;
pub mod file;
pub mod format;
pub mod handler;
pub mod http;
pub mod queue;
pub mod reader;
pub mod scheduler;
pub mod sign;
pub mod sink;

pub use error::AuditError;
pub use event::{AuditEvent, AuditEventBuilder};
pub use handler::{Action, ActionRequest, AuditEventHandler};
pub use reader::{EventReader, QueryResult};
pub use scheduler::FlushFailure;
pub use sign::{verify_chain, Blake3Signer, ChainVerification, Signer};
