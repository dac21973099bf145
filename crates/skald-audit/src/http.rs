//! HTTP collector sink.
//!
//! One batch becomes one POST: the concatenated payload is the request
//! body, authorization uses the configured scheme and token, and every
//! request carries a channel header identifying this sink instance.
//! Batches are all-or-nothing: a non-2xx response or transport failure
//! fails the whole batch and feeds the scheduler's retry policy.

use std::time::Duration;

use skald_core::ConnectionConfig;
use uuid::Uuid;

use crate::batch::Batch;
use crate::error::AuditError;

/// Header identifying the publishing channel, one UUID per sink.
pub const REQUEST_CHANNEL_HEADER: &str = "X-Audit-Request-Channel";

/// Write-only sink posting batches to a remote collector.
pub struct HttpBatchSink {
    client: reqwest::Client,
    url: String,
    authorization: String,
    channel: String,
}

impl HttpBatchSink {
    pub fn new(config: &ConnectionConfig) -> Result<Self, AuditError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_millis))
            .build()
            .map_err(|e| AuditError::SinkFailure(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            url: config.collector_url(),
            authorization: format!("{} {}", config.auth_scheme, config.token),
            channel: Uuid::new_v4().to_string(),
        })
    }

    /// Post one batch. Success is any 2xx response.
    pub async fn write_batch(&self, batch: &Batch) -> Result<(), AuditError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .header(REQUEST_CHANNEL_HEADER, &self.channel)
            .body(batch.payload.clone())
            .send()
            .await
            .map_err(|e| AuditError::SinkFailure(format!("collector request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuditError::SinkFailure(format!(
                "collector returned {status} for batch of {} events",
                batch.len()
            )));
        }
        tracing::debug!(events = batch.len(), bytes = batch.byte_len(), "Posted batch");
        Ok(())
    }
}
