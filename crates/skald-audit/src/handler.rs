//! Audit event handler façade.
//!
//! The handler owns the lifecycle (`created → started → shutdown`) and
//! exposes publish/read/query plus the `rotate` and `flush` actions over
//! the topics declared in its configuration. The write path goes through
//! the per-topic queue and flush task; the read path scans the file
//! sink's current file.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use skald_core::{HandlerConfig, SinkBackend};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::batch::BatchAssembler;
use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::file::FileSink;
use crate::format::RecordFormat;
use crate::http::HttpBatchSink;
use crate::queue::{EventQueue, QueuedRecord};
use crate::reader::{EventReader, QueryResult};
use crate::scheduler::{spawn_flush_task, write_with_retry, Control, FlushFailure};
use crate::sign::{Blake3Signer, Signer};
use crate::sink::EventSink;

/// Named actions addressable per topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Force a rotation of the topic's current file.
    Rotate,
    /// Drain the event buffer and flush file buffers to disk.
    Flush,
}

impl FromStr for Action {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rotate" => Ok(Self::Rotate),
            "flush" => Ok(Self::Flush),
            other => Err(AuditError::UnsupportedAction(other.to_string())),
        }
    }
}

/// An action request, optionally addressed to a specific handler when
/// several handlers share a topic namespace.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action: Action,
    pub target_handler: Option<String>,
}

impl ActionRequest {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            target_handler: None,
        }
    }

    pub fn with_target(mut self, handler: impl Into<String>) -> Self {
        self.target_handler = Some(handler.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerState {
    Created,
    Started,
    Shutdown,
}

struct TopicWorker {
    queue: Arc<EventQueue>,
    sink: Arc<EventSink>,
    control_tx: mpsc::Sender<Control>,
    task: JoinHandle<()>,
}

/// Façade over per-topic queues, flush tasks and sinks.
pub struct AuditEventHandler {
    config: HandlerConfig,
    signer: Option<Arc<dyn Signer>>,
    state: RwLock<HandlerState>,
    workers: RwLock<HashMap<String, TopicWorker>>,
    failures_tx: mpsc::UnboundedSender<FlushFailure>,
    failures_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<FlushFailure>>>,
}

impl AuditEventHandler {
    /// Create a handler from configuration. Signing key material is
    /// taken from the configuration; use [`with_signer`](Self::with_signer)
    /// to supply an external signer instead.
    pub fn new(config: HandlerConfig) -> Result<Self, AuditError> {
        config.validate()?;
        let signer: Option<Arc<dyn Signer>> = if config.signing.enabled {
            Some(Arc::new(Blake3Signer::new(config.signing.key_bytes()?)))
        } else {
            None
        };
        Ok(Self::build(config, signer))
    }

    /// Create a handler with an externally supplied signer.
    pub fn with_signer(
        config: HandlerConfig,
        signer: Arc<dyn Signer>,
    ) -> Result<Self, AuditError> {
        config.validate()?;
        Ok(Self::build(config, Some(signer)))
    }

    fn build(config: HandlerConfig, signer: Option<Arc<dyn Signer>>) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        Self {
            config,
            signer,
            state: RwLock::new(HandlerState::Created),
            workers: RwLock::new(HashMap::new()),
            failures_tx,
            failures_rx: std::sync::Mutex::new(Some(failures_rx)),
        }
    }

    /// Handler name, used for action addressing.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Take the receiver for terminal batch failures. The first caller
    /// gets it; subsequent calls return `None`.
    pub fn take_failures(&self) -> Option<mpsc::UnboundedReceiver<FlushFailure>> {
        self.failures_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Open per-topic files, initialize rotation and signing state, and
    /// start the flush tasks.
    pub async fn startup(&self) -> Result<(), AuditError> {
        {
            let mut state = self.write_state();
            match *state {
                HandlerState::Created => *state = HandlerState::Started,
                HandlerState::Started => return Err(AuditError::AlreadyStarted),
                HandlerState::Shutdown => return Err(AuditError::NotStarted),
            }
        }
        if !self.config.enabled {
            tracing::info!(handler = %self.config.name, "Handler disabled, events will be dropped");
            return Ok(());
        }

        if let Some(directory) = &self.config.log_directory {
            if self.config.backend.is_file_based() {
                std::fs::create_dir_all(directory)?;
            }
        }

        let signing_interval = (self.config.backend.is_file_based()
            && self.config.signing.enabled)
            .then(|| Duration::from_millis(self.config.signing.signature_interval_millis));

        let mut workers = HashMap::new();
        for topic in &self.config.topics {
            let sink = Arc::new(self.open_sink(topic)?);
            let queue = Arc::new(EventQueue::new(&self.config.buffering));
            let (control_tx, control_rx) = mpsc::channel(8);
            let task = spawn_flush_task(
                topic.clone(),
                Arc::clone(&queue),
                Arc::clone(&sink),
                self.config.buffering.clone(),
                signing_interval,
                self.failures_tx.clone(),
                control_rx,
            );
            workers.insert(
                topic.clone(),
                TopicWorker {
                    queue,
                    sink,
                    control_tx,
                    task,
                },
            );
        }
        *self.write_workers() = workers;
        tracing::info!(
            handler = %self.config.name,
            topics = self.config.topics.len(),
            "Audit event handler started"
        );
        Ok(())
    }

    /// Publish one event.
    ///
    /// Buffered mode returns as soon as the queue accepts the event,
    /// failing fast with [`AuditError::QueueFull`] when it does not.
    /// Unbuffered mode writes through to the sink and returns only after
    /// the sink acknowledges (or the retry budget is exhausted).
    pub async fn publish(&self, topic: &str, event: AuditEvent) -> Result<String, AuditError> {
        self.ensure_started()?;
        if !self.config.enabled {
            return Ok(event.id);
        }
        let (queue, sink) = {
            let workers = self.read_workers();
            let worker = workers
                .get(topic)
                .ok_or_else(|| AuditError::UnknownTopic(topic.to_string()))?;
            (Arc::clone(&worker.queue), Arc::clone(&worker.sink))
        };
        let id = event.id.clone();
        let line = sink.render_record(topic, &event)?;
        tracing::debug!(topic = %topic, event_id = %id, "Audit event");

        if self.config.buffering.enabled {
            let accepted = queue.offer(QueuedRecord {
                id: id.clone(),
                line,
            });
            if !accepted {
                return Err(AuditError::QueueFull {
                    topic: topic.to_string(),
                    event_id: id,
                });
            }
        } else {
            let assembler =
                BatchAssembler::new(self.config.buffering.average_per_event_payload_size);
            let batch = assembler.assemble(vec![QueuedRecord {
                id: id.clone(),
                line,
            }]);
            write_with_retry(
                &sink,
                &batch,
                self.config.buffering.max_flush_retries,
                Duration::from_millis(self.config.buffering.retry_interval_millis),
            )
            .await?;
        }
        Ok(id)
    }

    /// Point lookup by event identifier against the topic's current file.
    pub async fn read_event(&self, topic: &str, id: &str) -> Result<AuditEvent, AuditError> {
        self.ensure_started()?;
        if !self.config.enabled {
            return Err(AuditError::NotFound(id.to_string()));
        }
        let reader = self.reader_for(topic)?;
        reader.read_event(id)
    }

    /// Predicate-filtered query against the topic's current file. The
    /// predicate is supplied externally; `on_match` may return `false`
    /// to stop the scan early, making the returned total partial.
    pub async fn query_events(
        &self,
        topic: &str,
        predicate: impl Fn(&AuditEvent) -> bool,
        on_match: impl FnMut(&AuditEvent) -> bool,
    ) -> Result<QueryResult, AuditError> {
        self.ensure_started()?;
        if !self.config.enabled {
            return Ok(QueryResult {
                matches: 0,
                exact: true,
            });
        }
        let reader = self.reader_for(topic)?;
        reader.query_events(predicate, on_match)
    }

    /// Execute a named action against one topic.
    pub async fn handle_action(
        &self,
        topic: &str,
        request: ActionRequest,
    ) -> Result<(), AuditError> {
        self.ensure_started()?;
        if let Some(target) = &request.target_handler {
            if target != &self.config.name {
                return Err(AuditError::WrongTargetHandler {
                    target: target.clone(),
                    name: self.config.name.clone(),
                });
            }
        }
        if !self.config.enabled {
            return Ok(());
        }
        let control_tx = {
            let workers = self.read_workers();
            let worker = workers
                .get(topic)
                .ok_or_else(|| AuditError::UnknownTopic(topic.to_string()))?;
            worker.control_tx.clone()
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        let control = match request.action {
            Action::Rotate => Control::Rotate(ack_tx),
            Action::Flush => Control::Flush(ack_tx),
        };
        control_tx
            .send(control)
            .await
            .map_err(|_| AuditError::NotStarted)?;
        ack_rx.await.map_err(|_| AuditError::NotStarted)?
    }

    /// Stop the flush tasks, force a final flush per topic, and close
    /// files after their closing signature. A topic that cannot flush
    /// within the shutdown grace period is abandoned and reported.
    pub async fn shutdown(&self) -> Result<(), AuditError> {
        {
            let mut state = self.write_state();
            match *state {
                HandlerState::Started | HandlerState::Created => {
                    *state = HandlerState::Shutdown;
                }
                HandlerState::Shutdown => return Ok(()),
            }
        }
        let workers = std::mem::take(&mut *self.write_workers());
        let grace = Duration::from_millis(self.config.shutdown_grace_millis);
        let mut first_error: Option<AuditError> = None;

        for (topic, worker) in workers {
            let (ack_tx, ack_rx) = oneshot::channel();
            let sent = worker.control_tx.send(Control::Shutdown(ack_tx)).await;
            let worker_gone = || {
                AuditError::SinkFailure(format!(
                    "flush task for topic '{topic}' stopped before acknowledging shutdown"
                ))
            };
            let result = if sent.is_err() {
                Err(worker_gone())
            } else {
                match tokio::time::timeout(grace, ack_rx).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(worker_gone()),
                    Err(_) => {
                        worker.task.abort();
                        Err(AuditError::ShutdownTimeout(topic.clone()))
                    }
                }
            };
            if let Err(error) = result {
                tracing::error!(topic = %topic, error = %error, "Shutdown flush failed");
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        tracing::info!(handler = %self.config.name, "Audit event handler stopped");
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn open_sink(&self, topic: &str) -> Result<EventSink, AuditError> {
        match self.config.backend {
            SinkBackend::Json | SinkBackend::Csv => {
                let format = match self.config.backend {
                    SinkBackend::Json => RecordFormat::Json,
                    _ => RecordFormat::Csv,
                };
                let directory = self
                    .config
                    .log_directory
                    .as_deref()
                    .ok_or_else(|| AuditError::SinkFailure("log_directory not set".into()))?;
                let signer = if self.config.signing.enabled {
                    self.signer.clone()
                } else {
                    None
                };
                Ok(EventSink::File(FileSink::open(
                    topic,
                    directory,
                    format,
                    self.config.file_rotation.clone(),
                    signer,
                )?))
            }
            SinkBackend::Http => {
                let connection = self
                    .config
                    .connection
                    .as_ref()
                    .ok_or_else(|| AuditError::SinkFailure("connection not set".into()))?;
                Ok(EventSink::Http(HttpBatchSink::new(connection)?))
            }
        }
    }

    fn reader_for(&self, topic: &str) -> Result<EventReader, AuditError> {
        let workers = self.read_workers();
        let worker = workers
            .get(topic)
            .ok_or_else(|| AuditError::UnknownTopic(topic.to_string()))?;
        let path = worker.sink.current_path().ok_or_else(|| {
            AuditError::UnsupportedOperation(
                "read and query are not supported by the http sink".into(),
            )
        })?;
        let format = worker
            .sink
            .format()
            .unwrap_or(RecordFormat::Json);
        Ok(EventReader::new(path, format))
    }

    fn ensure_started(&self) -> Result<(), AuditError> {
        match *self.read_state() {
            HandlerState::Started => Ok(()),
            _ => Err(AuditError::NotStarted),
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, HandlerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, HandlerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_workers(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, TopicWorker>> {
        self.workers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_workers(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, TopicWorker>> {
        self.workers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skald_core::HandlerConfig;

    fn config(dir: &std::path::Path) -> HandlerConfig {
        HandlerConfig::from_yaml(&format!(
            r#"
            name: json
            topics: [access, activity]
            log_directory: {}
            buffering:
              write_interval_millis: 10
            "#,
            dir.display()
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn publish_requires_started_state() {
        let dir = tempfile::tempdir().unwrap();
        let handler = AuditEventHandler::new(config(dir.path())).unwrap();
        let err = handler
            .publish("access", AuditEvent::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::NotStarted));
    }

    #[tokio::test]
    async fn startup_is_not_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        let handler = AuditEventHandler::new(config(dir.path())).unwrap();
        handler.startup().await.unwrap();
        assert!(matches!(
            handler.startup().await,
            Err(AuditError::AlreadyStarted)
        ));
        handler.shutdown().await.unwrap();
        assert!(matches!(
            handler.startup().await,
            Err(AuditError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn unknown_topic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let handler = AuditEventHandler::new(config(dir.path())).unwrap();
        handler.startup().await.unwrap();
        let err = handler
            .publish("recon", AuditEvent::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::UnknownTopic(_)));
        handler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn actions_respect_target_handler() {
        let dir = tempfile::tempdir().unwrap();
        let handler = AuditEventHandler::new(config(dir.path())).unwrap();
        handler.startup().await.unwrap();

        let err = handler
            .handle_action(
                "access",
                ActionRequest::new(Action::Flush).with_target("csv"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::WrongTargetHandler { .. }));

        handler
            .handle_action(
                "access",
                ActionRequest::new(Action::Flush).with_target("json"),
            )
            .await
            .unwrap();
        handler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn rotate_action_errors_when_rotation_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let handler = AuditEventHandler::new(config(dir.path())).unwrap();
        handler.startup().await.unwrap();
        let err = handler
            .handle_action("access", ActionRequest::new(Action::Rotate))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::UnsupportedOperation(_)));
        handler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_reports_a_dead_flush_task_as_sink_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.topics = vec!["access".into()];
        let handler = AuditEventHandler::new(cfg).unwrap();
        handler.startup().await.unwrap();

        {
            let workers = handler.read_workers();
            workers["access"].task.abort();
        }
        tokio::task::yield_now().await;

        let err = handler.shutdown().await.unwrap_err();
        assert!(matches!(err, AuditError::SinkFailure(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn disabled_handler_accepts_and_drops() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.enabled = false;
        let handler = AuditEventHandler::new(cfg).unwrap();
        handler.startup().await.unwrap();

        let id = handler.publish("access", AuditEvent::new()).await.unwrap();
        assert!(matches!(
            handler.read_event("access", &id).await,
            Err(AuditError::NotFound(_))
        ));
        handler.shutdown().await.unwrap();
    }

    #[test]
    fn action_names_parse() {
        assert_eq!("rotate".parse::<Action>().unwrap(), Action::Rotate);
        assert_eq!("flush".parse::<Action>().unwrap(), Action::Flush);
        assert!(matches!(
            "compact".parse::<Action>(),
            Err(AuditError::UnsupportedAction(_))
        ));
    }
}
