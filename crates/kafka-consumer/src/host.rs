use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use model::CommandContext;
use projection::RecordHandler;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{ConsumeError, ConsumerMetrics, RecordSource};

/// Lifecycle of a [`ConsumerHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostState::Stopped => "stopped",
            HostState::Starting => "starting",
            HostState::Running => "running",
            HostState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Read-only view of a host's state, cheap to clone and hand out.
#[derive(Debug, Clone)]
pub struct HostStatus {
    topic: String,
    schema: String,
    state: watch::Receiver<HostState>,
}

impl HostStatus {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn state(&self) -> HostState {
        *self.state.borrow()
    }
}

/// Runs `consume -> handle` for one source in a background task.
///
/// Records are handled one at a time, in the order the source yields them.
/// A failing record is logged and skipped; only cancellation ends the loop.
pub struct ConsumerHost<S, H> {
    source: Arc<S>,
    handler: Arc<H>,
    ctx: CommandContext,
    schema: String,
    metrics: Option<ConsumerMetrics>,
    state: Arc<watch::Sender<HostState>>,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl<S, H> ConsumerHost<S, H>
where
    S: RecordSource,
    H: RecordHandler<Record = S::Record>,
{
    pub fn new(source: S, handler: H, ctx: CommandContext, schema: impl Into<String>) -> Self {
        let (state, _) = watch::channel(HostState::Stopped);
        Self {
            source: Arc::new(source),
            handler: Arc::new(handler),
            ctx,
            schema: schema.into(),
            metrics: None,
            state: Arc::new(state),
            running: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ConsumerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> HostState {
        *self.state.borrow()
    }

    pub fn status(&self) -> HostStatus {
        HostStatus {
            topic: self.source.topic().to_string(),
            schema: self.schema.clone(),
            state: self.state.subscribe(),
        }
    }

    /// Spawns the consume loop and returns immediately. No-op when already started.
    pub fn start(&mut self) {
        if self.running.is_some() {
            warn!(topic = %self.source.topic(), "Consumer host already started");
            return;
        }
        self.state.send_replace(HostState::Starting);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            self.source.clone(),
            self.handler.clone(),
            self.ctx.clone(),
            self.metrics.clone(),
            self.state.clone(),
            cancel.clone(),
        ));
        self.running = Some((cancel, task));
    }

    /// Cancels the loop, waits for it to finish the record in flight and
    /// closes the source.
    pub async fn stop(&mut self) {
        let Some((cancel, task)) = self.running.take() else {
            return;
        };
        self.state.send_replace(HostState::Stopping);
        cancel.cancel();
        if let Err(e) = task.await {
            error!(topic = %self.source.topic(), error = %e, "Consumer task failed");
        }
        self.source.close();
        self.state.send_replace(HostState::Stopped);
        info!(topic = %self.source.topic(), "Consumer host stopped");
    }
}

/// Object-safe lifecycle of a host, for holding hosts of different record
/// types side by side.
#[async_trait]
pub trait HostedConsumer: Send {
    fn start(&mut self);
    async fn stop(&mut self);
    fn status(&self) -> HostStatus;
}

#[async_trait]
impl<S, H> HostedConsumer for ConsumerHost<S, H>
where
    S: RecordSource,
    H: RecordHandler<Record = S::Record>,
{
    fn start(&mut self) {
        ConsumerHost::start(self)
    }

    async fn stop(&mut self) {
        ConsumerHost::stop(self).await
    }

    fn status(&self) -> HostStatus {
        ConsumerHost::status(self)
    }
}

async fn run_loop<S, H>(
    source: Arc<S>,
    handler: Arc<H>,
    ctx: CommandContext,
    metrics: Option<ConsumerMetrics>,
    state: Arc<watch::Sender<HostState>>,
    cancel: CancellationToken,
) where
    S: RecordSource,
    H: RecordHandler<Record = S::Record>,
{
    let topic = source.topic().to_string();
    state.send_if_modified(|current| {
        if *current == HostState::Starting {
            *current = HostState::Running;
            true
        } else {
            false
        }
    });
    info!(topic = %topic, "Consumer host running");

    loop {
        let (key, record) = match source.consume(&cancel).await {
            Ok(message) => message,
            Err(ConsumeError::Cancelled) => {
                debug!(topic = %topic, "Consume cancelled");
                break;
            }
            Err(e) => {
                warn!(topic = %topic, action = "consume", status = e.outcome(), error = %e, "Skipping message");
                if let Some(metrics) = &metrics {
                    metrics.record(&topic, e.outcome());
                }
                continue;
            }
        };

        let started = Instant::now();
        let result = handler.handle(&ctx, &key, record).await;
        if let Some(metrics) = &metrics {
            metrics.observe_handle(&topic, started.elapsed());
        }

        match result {
            Ok(outcome) => {
                info!(
                    topic = %topic,
                    key = %key,
                    action = outcome.action(),
                    status = "ok",
                    content_id = %outcome.content_id(),
                    "Record projected"
                );
                if let Some(metrics) = &metrics {
                    metrics.record(&topic, outcome.action());
                }
            }
            Err(e) => {
                error!(
                    topic = %topic,
                    key = %key,
                    action = "handle",
                    status = "failed",
                    error = %e,
                    "Failed to project record"
                );
                if let Some(metrics) = &metrics {
                    metrics.record(&topic, "handle_error");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DecodeError;
    use app_config::ConsumerOptions;
    use model::{Actor, AppId, Command, DynamicRecord, PrimitiveType};
    use projection::DynamicRecordHandler;
    use prometheus::Registry;
    use repository::InMemoryContentStore;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    type Item = Result<(String, DynamicRecord), ConsumeError>;

    /// Hands out queued items first, then waits for cancellation.
    struct QueueSource {
        items: Mutex<VecDeque<Item>>,
        closed: AtomicUsize,
    }

    impl QueueSource {
        fn new(items: Vec<Item>) -> Self {
            Self {
                items: Mutex::new(items.into()),
                closed: AtomicUsize::new(0),
            }
        }

        fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecordSource for QueueSource {
        type Record = DynamicRecord;

        fn topic(&self) -> &str {
            "rates"
        }

        async fn consume(
            &self,
            cancel: &CancellationToken,
        ) -> Result<(String, DynamicRecord), ConsumeError> {
            if let Some(item) = self.items.lock().await.pop_front() {
                return item;
            }
            cancel.cancelled().await;
            Err(ConsumeError::Cancelled)
        }

        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ctx() -> CommandContext {
        CommandContext::new(AppId::new("market"), Actor::client("kafka-rates"))
    }

    fn rate(key: &str, price: f64) -> Item {
        let record = DynamicRecord::new()
            .with("price", PrimitiveType::Double, json!(price))
            .with("active", PrimitiveType::Bool, json!(true));
        Ok((key.to_string(), record))
    }

    fn host(
        store: Arc<InMemoryContentStore>,
        items: Vec<Item>,
    ) -> ConsumerHost<QueueSource, DynamicRecordHandler> {
        let options = ConsumerOptions::new("rates", "market", "rates", "kafka-rates");
        let handler = DynamicRecordHandler::new(store, &options);
        ConsumerHost::new(QueueSource::new(items), handler, ctx(), "rates")
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let store = Arc::new(InMemoryContentStore::new());
        let unsupported = DynamicRecord::new()
            .with("tags", PrimitiveType::Other("array".into()), json!(["x"]));
        let items = vec![
            rate("A", 1.0),
            Err(ConsumeError::Decode {
                partition: 0,
                offset: 1,
                source: DecodeError::EmptyPayload,
            }),
            Ok(("C".to_string(), unsupported)),
            rate("B", 2.0),
            rate("A", 3.0),
        ];
        let registry = Registry::new();
        let metrics = ConsumerMetrics::register(&registry).unwrap();
        let mut host = host(store.clone(), items).with_metrics(metrics.clone());

        host.start();
        host.stop().await;

        assert_eq!(store.contents().await.len(), 2);
        let commands = store.commands().await;
        let kinds: Vec<_> = commands.iter().map(|c| c.command.kind()).collect();
        assert_eq!(
            kinds,
            vec!["create_schema", "create_content", "create_content", "update_content"]
        );
        let Command::CreateContent { data: first, .. } = &commands[1].command else {
            panic!("expected create, got {:?}", commands[1].command);
        };
        let Command::CreateContent { data: second, .. } = &commands[2].command else {
            panic!("expected create, got {:?}", commands[2].command);
        };
        assert_eq!(first.get("price"), Some(&json!(1.0)));
        assert_eq!(second.get("price"), Some(&json!(2.0)));

        let handler_a = host.handler.identities().get("A").await.unwrap();
        let Command::UpdateContent { content_id, data } = &commands[3].command else {
            panic!("expected update, got {:?}", commands[3].command);
        };
        assert_eq!(*content_id, handler_a);
        let stored = store.content(handler_a).await.unwrap();
        assert_eq!(stored.data.get("price"), Some(&json!(3.0)));
        assert_eq!(data.get("price"), Some(&json!(3.0)));

        assert_eq!(metrics.count("rates", "created"), 2);
        assert_eq!(metrics.count("rates", "updated"), 1);
        assert_eq!(metrics.count("rates", "decode_error"), 1);
        assert_eq!(metrics.count("rates", "handle_error"), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop_transitions() {
        let store = Arc::new(InMemoryContentStore::new());
        let mut host = host(store, Vec::new());
        let status = host.status();
        assert_eq!(status.state(), HostState::Stopped);
        assert_eq!(status.topic(), "rates");
        assert_eq!(status.schema(), "rates");

        host.start();
        assert!(matches!(host.state(), HostState::Starting | HostState::Running));

        host.stop().await;
        assert_eq!(host.state(), HostState::Stopped);
        assert_eq!(status.state(), HostState::Stopped);
    }

    #[tokio::test]
    async fn test_idle_host_stops_promptly() {
        let store = Arc::new(InMemoryContentStore::new());
        let mut host = host(store, Vec::new());
        host.start();

        tokio::time::timeout(std::time::Duration::from_secs(1), host.stop())
            .await
            .expect("stop should not hang on an idle consumer");
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let store = Arc::new(InMemoryContentStore::new());
        let mut host = host(store, Vec::new());
        host.stop().await;
        assert_eq!(host.state(), HostState::Stopped);
        assert_eq!(host.source.closed(), 0);
    }

    #[tokio::test]
    async fn test_host_can_restart() {
        let store = Arc::new(InMemoryContentStore::new());
        let mut host = host(store.clone(), vec![rate("A", 1.0)]);
        host.start();
        host.stop().await;
        assert_eq!(host.source.closed(), 1);
        host.start();
        host.stop().await;
        assert_eq!(host.source.closed(), 2);
        assert_eq!(store.contents().await.len(), 1);
        assert_eq!(host.state(), HostState::Stopped);
    }

    #[tokio::test]
    async fn test_hosts_behind_trait_object() {
        let store = Arc::new(InMemoryContentStore::new());
        let mut hosts: Vec<Box<dyn HostedConsumer>> = vec![
            Box::new(host(store.clone(), vec![rate("A", 1.0)])),
            Box::new(host(store.clone(), vec![rate("B", 1.0)])),
        ];
        for host in hosts.iter_mut() {
            host.start();
        }
        for host in hosts.iter_mut() {
            host.stop().await;
        }

        assert!(hosts.iter().all(|h| h.status().state() == HostState::Stopped));
        assert_eq!(store.contents().await.len(), 2);
    }
}
