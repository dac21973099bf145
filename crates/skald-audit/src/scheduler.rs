//! Background flush scheduling.
//!
//! Each topic gets one dedicated task that owns the drain side of the
//! queue and the only reference that writes to the sink. Because the
//! task is the sole flusher, at most one flush is in flight per topic
//! and batches can never overlap or reorder. Triggers — the write
//! interval, the queue's high-water wake-up, and explicit control
//! commands — are coalesced by the select loop: a trigger arriving
//! mid-flush is simply observed on the next iteration.

use std::sync::Arc;
use std::time::Duration;

use skald_core::BufferingConfig;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::batch::{Batch, BatchAssembler};
use crate::error::AuditError;
use crate::queue::EventQueue;
use crate::sink::EventSink;

/// Control commands addressed to one topic's flush task.
pub enum Control {
    /// Drain the queue and flush file buffers, then acknowledge.
    Flush(oneshot::Sender<Result<(), AuditError>>),
    /// Drain, then force a rotation.
    Rotate(oneshot::Sender<Result<(), AuditError>>),
    /// Final drain, closing signature, release resources.
    Shutdown(oneshot::Sender<Result<(), AuditError>>),
}

/// A batch that exhausted its retries. Buffered producers already got
/// "accepted" for these events and are not retroactively notified; this
/// record is the handler-level error channel.
#[derive(Debug)]
pub struct FlushFailure {
    pub topic: String,
    pub event_ids: Vec<String>,
    pub error: AuditError,
}

/// Spawn the flush task for one topic.
pub fn spawn_flush_task(
    topic: String,
    queue: Arc<EventQueue>,
    sink: Arc<EventSink>,
    buffering: BufferingConfig,
    signing_interval: Option<Duration>,
    failures: mpsc::UnboundedSender<FlushFailure>,
    mut control_rx: mpsc::Receiver<Control>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let assembler = BatchAssembler::new(buffering.average_per_event_payload_size);
        let retry_interval = Duration::from_millis(buffering.retry_interval_millis);

        let mut write_tick =
            tokio::time::interval(Duration::from_millis(buffering.write_interval_millis));
        write_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let signing_enabled = signing_interval.is_some();
        let mut sign_tick = tokio::time::interval(
            signing_interval.unwrap_or(Duration::from_secs(24 * 60 * 60)),
        );
        sign_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = write_tick.tick() => {
                    drain_all(&topic, &queue, &sink, &assembler, &buffering, retry_interval, &failures).await;
                }
                _ = queue.notified() => {
                    drain_all(&topic, &queue, &sink, &assembler, &buffering, retry_interval, &failures).await;
                }
                _ = sign_tick.tick(), if signing_enabled => {
                    if let Err(error) = sink.sign_now().await {
                        tracing::error!(topic = %topic, error = %error, "Periodic signing failed");
                    }
                }
                cmd = control_rx.recv() => {
                    match cmd {
                        Some(Control::Flush(ack)) => {
                            let mut result = drain_all(&topic, &queue, &sink, &assembler, &buffering, retry_interval, &failures).await;
                            if result.is_ok() {
                                result = sink.flush().await;
                            }
                            let _ = ack.send(result);
                        }
                        Some(Control::Rotate(ack)) => {
                            let mut result = drain_all(&topic, &queue, &sink, &assembler, &buffering, retry_interval, &failures).await;
                            if result.is_ok() {
                                result = sink.rotate().await;
                            }
                            let _ = ack.send(result);
                        }
                        Some(Control::Shutdown(ack)) => {
                            let mut result = drain_all(&topic, &queue, &sink, &assembler, &buffering, retry_interval, &failures).await;
                            match sink.close().await {
                                Ok(()) => {}
                                Err(error) if result.is_ok() => result = Err(error),
                                Err(error) => {
                                    tracing::error!(topic = %topic, error = %error, "Failed to close sink");
                                }
                            }
                            let _ = ack.send(result);
                            break;
                        }
                        None => {
                            // handler dropped without shutdown; drain what we can
                            let _ = drain_all(&topic, &queue, &sink, &assembler, &buffering, retry_interval, &failures).await;
                            let _ = sink.close().await;
                            break;
                        }
                    }
                }
            }
        }
        tracing::debug!(topic = %topic, "Flush task stopped");
    })
}

/// Drain the queue batch by batch until empty. Terminal batch failures
/// are reported on the failure channel; the first one is also returned
/// so explicit flush callers observe it.
async fn drain_all(
    topic: &str,
    queue: &EventQueue,
    sink: &EventSink,
    assembler: &BatchAssembler,
    buffering: &BufferingConfig,
    retry_interval: Duration,
    failures: &mpsc::UnboundedSender<FlushFailure>,
) -> Result<(), AuditError> {
    let mut first_error: Option<AuditError> = None;
    loop {
        let records = queue.drain(buffering.max_batch_events, buffering.max_batch_bytes);
        if records.is_empty() {
            break;
        }
        let batch = assembler.assemble(records);
        if let Err(error) = write_with_retry(
            sink,
            &batch,
            buffering.max_flush_retries,
            retry_interval,
        )
        .await
        {
            tracing::error!(
                topic = %topic,
                events = batch.len(),
                error = %error,
                "Batch delivery failed after retries"
            );
            let reported = FlushFailure {
                topic: topic.to_string(),
                event_ids: batch.ids,
                error,
            };
            if first_error.is_none() {
                first_error = Some(AuditError::SinkFailure(reported.error.to_string()));
            }
            let _ = failures.send(reported);
        }
    }
    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Write one batch, retrying the identical payload a bounded number of
/// times before giving up.
pub(crate) async fn write_with_retry(
    sink: &EventSink,
    batch: &Batch,
    max_retries: u32,
    retry_interval: Duration,
) -> Result<(), AuditError> {
    let mut attempt = 0u32;
    loop {
        match sink.write_batch(batch).await {
            Ok(()) => return Ok(()),
            Err(error) if attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max_retries,
                    error = %error,
                    "Batch write failed, retrying"
                );
                tokio::time::sleep(retry_interval).await;
            }
            Err(error) => return Err(error),
        }
    }
}
