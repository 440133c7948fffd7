// Queue Manager
//
// Explicitly constructed context object wrapping one operation queue,
// the worker pool, and the managing layers (scaler, monitor, health,
// alerts, batch optimizer). Lifecycle is a state machine:
// Uninitialized -> Running -> Destroyed.

use crate::application::alerts::AlertEngine;
use crate::application::autoscaler::AutoScaler;
use crate::application::batch::BatchOptimizer;
use crate::application::health::HealthRunner;
use crate::application::monitor::ResourceMonitor;
use crate::application::queue::{
    ClearOptions, DispatchGate, EnqueueOptions, OperationQueue, QueueStatus,
};
use crate::application::retry::RetryEvaluator;
use crate::application::scheduler::PriorityScheduler;
use crate::application::worker::{
    shutdown_channel, ShutdownSender, SyncWorker, WorkerRegistry,
};
use crate::config::ManagerConfig;
use crate::domain::alert::Alert;
use crate::domain::events::QueueEvent;
use crate::domain::health::HealthStatus;
use crate::domain::operation::{ItemId, Operation, QueueItem};
use crate::domain::worker::{ScalingEvent, Worker};
use crate::error::{QueueError, Result};
use crate::port::{
    IdProvider, NotificationChannel, ResourceProbe, StateStore, SyncExecutor, TimeProvider,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const SNAPSHOT_ITEMS_KEY: &str = "queue_items";
const SNAPSHOT_ALERTS_KEY: &str = "alerts";
const SNAPSHOT_SCALING_KEY: &str = "scaling_history";

/// Event channel capacity; slow subscribers lag rather than block
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Grace period for task teardown on destroy
const DESTROY_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Running,
    Destroyed,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Running => "running",
            Lifecycle::Destroyed => "destroyed",
        };
        write!(f, "{}", name)
    }
}

pub struct QueueManager {
    config: ManagerConfig,
    queue: Arc<OperationQueue>,
    registry: Arc<WorkerRegistry>,
    gate: Arc<DispatchGate>,
    scaler: Arc<AutoScaler>,
    monitor: Arc<ResourceMonitor>,
    health: Arc<HealthRunner>,
    alerts: Arc<AlertEngine>,
    optimizer: BatchOptimizer,
    executor: Arc<dyn SyncExecutor>,
    store: Arc<dyn StateStore>,
    probe: Arc<dyn ResourceProbe>,
    time: Arc<dyn TimeProvider>,
    events: broadcast::Sender<QueueEvent>,
    lifecycle: Mutex<Lifecycle>,
    shutdown: Mutex<Option<ShutdownSender>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl QueueManager {
    /// Construct a manager. The configuration is validated here; an
    /// invalid configuration is fatal and nothing is started.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ManagerConfig,
        executor: Arc<dyn SyncExecutor>,
        store: Arc<dyn StateStore>,
        probe: Arc<dyn ResourceProbe>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        time: Arc<dyn TimeProvider>,
        ids: Arc<dyn IdProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let queue = Arc::new(OperationQueue::new(
            config.queue.clone(),
            PriorityScheduler::new(config.priority_rules.clone()),
            RetryEvaluator::new(config.retry.clone()),
            time.clone(),
            ids.clone(),
            events.clone(),
        ));
        let gate = Arc::new(DispatchGate::new(
            config.dispatch.throttle.as_ref(),
            config.dispatch.adaptive_throttling,
            time.now_millis(),
        ));
        let registry = Arc::new(WorkerRegistry::new(&config.scaling));
        let scaler = Arc::new(AutoScaler::new(
            registry.clone(),
            queue.clone(),
            config.scaling.clone(),
            time.clone(),
            events.clone(),
        ));
        let alerts = Arc::new(AlertEngine::new(
            config.alert_rules.clone(),
            channels,
            time.clone(),
            ids,
            events.clone(),
        ));
        let monitor = Arc::new(ResourceMonitor::new(
            probe.clone(),
            gate.clone(),
            queue.clone(),
            alerts.clone(),
            config.resources.clone(),
        ));
        let health = Arc::new(HealthRunner::new(
            probe.clone(),
            queue.clone(),
            gate.clone(),
            scaler.clone(),
            config.health.clone(),
            time.clone(),
            events.clone(),
        ));
        let optimizer = BatchOptimizer::new(config.batch_strategies.clone());

        Ok(Self {
            config,
            queue,
            registry,
            gate,
            scaler,
            monitor,
            health,
            alerts,
            optimizer,
            executor,
            store,
            probe,
            time,
            events,
            lifecycle: Mutex::new(Lifecycle::Uninitialized),
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    fn ensure_running(&self) -> Result<()> {
        let state = *self.lifecycle.lock().unwrap();
        if state != Lifecycle::Running {
            return Err(QueueError::InvalidState {
                expected: Lifecycle::Running.to_string(),
                actual: state.to_string(),
            });
        }
        Ok(())
    }

    /// Restore persisted state and start workers and timers.
    /// Valid only from Uninitialized.
    pub async fn initialize(&self) -> Result<()> {
        {
            let mut state = self.lifecycle.lock().unwrap();
            if *state != Lifecycle::Uninitialized {
                return Err(QueueError::InvalidState {
                    expected: Lifecycle::Uninitialized.to_string(),
                    actual: state.to_string(),
                });
            }
            *state = Lifecycle::Running;
        }

        info!("Queue manager initializing");
        self.restore_state().await?;

        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let mut tasks = Vec::new();

        // One dispatch loop per worker slot; disabled slots idle until
        // the scaler enables them
        for slot in 0..self.registry.total() {
            let worker = SyncWorker::new(
                slot,
                self.queue.clone(),
                self.executor.clone(),
                self.probe.clone(),
                self.gate.clone(),
                self.registry.clone(),
                self.time.clone(),
                self.config.queue.clone(),
                self.config.dispatch.clone(),
            );
            let token = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = worker.run(token).await {
                    error!(slot, error = %e, "Worker loop failed");
                }
            }));
        }

        tasks.push(tokio::spawn(
            self.scaler.clone().run(shutdown_rx.clone()),
        ));
        tasks.push(tokio::spawn(
            self.monitor.clone().run(shutdown_rx.clone()),
        ));
        tasks.push(tokio::spawn(
            self.health.clone().run(shutdown_rx.clone()),
        ));
        tasks.push(tokio::spawn(Self::metrics_loop(
            self.queue.clone(),
            self.registry.clone(),
            self.alerts.clone(),
            self.scaler.clone(),
            self.store.clone(),
            self.events.clone(),
            self.config.metrics_interval_ms,
            shutdown_rx.clone(),
        )));
        tasks.push(tokio::spawn(Self::cleanup_loop(
            self.queue.clone(),
            self.config.queue.cleanup_interval_ms,
            shutdown_rx,
        )));

        *self.shutdown.lock().unwrap() = Some(shutdown_tx);
        *self.tasks.lock().unwrap() = tasks;

        info!(
            workers = self.registry.total(),
            enabled = self.registry.enabled_count(),
            "Queue manager running"
        );
        Ok(())
    }

    /// Stop all tasks, persist a final snapshot, and transition to
    /// Destroyed. A destroyed manager cannot be restarted.
    pub async fn destroy(&self) -> Result<()> {
        {
            let mut state = self.lifecycle.lock().unwrap();
            if *state != Lifecycle::Running {
                return Err(QueueError::InvalidState {
                    expected: Lifecycle::Running.to_string(),
                    actual: state.to_string(),
                });
            }
            *state = Lifecycle::Destroyed;
        }

        info!("Queue manager shutting down");
        if let Some(shutdown) = self.shutdown.lock().unwrap().take() {
            shutdown.shutdown();
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        let join_all = futures::future::join_all(tasks);
        if tokio::time::timeout(DESTROY_JOIN_TIMEOUT, join_all)
            .await
            .is_err()
        {
            warn!("Some tasks did not stop within the destroy timeout");
        }

        self.persist_state().await?;
        info!("Queue manager destroyed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queue operations (valid while Running)
    // ------------------------------------------------------------------

    /// Admit an operation, applying batch coalescing when configured
    pub fn enqueue(&self, operation: Operation, options: EnqueueOptions) -> Result<ItemId> {
        self.ensure_running()?;
        if self.optimizer.is_empty() {
            self.queue.enqueue(operation, options)
        } else {
            self.optimizer
                .enqueue_optimized(&self.queue, operation, options)
        }
    }

    pub fn dequeue(&self, id: &str) -> Result<bool> {
        self.ensure_running()?;
        Ok(self.queue.dequeue(id))
    }

    pub fn retry(&self, id: &str) -> Result<bool> {
        self.ensure_running()?;
        Ok(self.queue.retry(id))
    }

    pub fn cancel(&self, id: &str) -> Result<bool> {
        self.ensure_running()?;
        Ok(self.queue.cancel(id))
    }

    pub fn clear(&self, options: &ClearOptions) -> Result<usize> {
        self.ensure_running()?;
        Ok(self.queue.clear(options))
    }

    pub fn status(&self) -> Result<QueueStatus> {
        self.ensure_running()?;
        Ok(self.queue.status())
    }

    pub fn get(&self, id: &str) -> Option<QueueItem> {
        self.queue.get(id)
    }

    // ------------------------------------------------------------------
    // Management surface
    // ------------------------------------------------------------------

    pub fn health(&self) -> Option<HealthStatus> {
        self.health.current()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.alerts()
    }

    pub fn resolve_alert(&self, alert_id: &str) -> Result<bool> {
        self.ensure_running()?;
        Ok(self.alerts.resolve(alert_id))
    }

    pub fn workers(&self) -> Vec<Worker> {
        self.registry.snapshot()
    }

    pub fn scaling_history(&self) -> Vec<ScalingEvent> {
        self.scaler.history()
    }

    /// Manual scale request, clamped to the configured bounds
    pub fn scale_to(&self, target: usize) -> Result<ScalingEvent> {
        self.ensure_running()?;
        Ok(self.scaler.scale_to(target, "manual scale request"))
    }

    /// Subscribe to the observable event stream
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    async fn restore_state(&self) -> Result<()> {
        if let Some(bytes) = self.store.load(SNAPSHOT_ITEMS_KEY).await? {
            let items: Vec<QueueItem> = serde_json::from_slice(&bytes)?;
            self.queue.restore_items(items);
        }
        if let Some(bytes) = self.store.load(SNAPSHOT_ALERTS_KEY).await? {
            let alerts: Vec<Alert> = serde_json::from_slice(&bytes)?;
            self.alerts.restore(alerts);
        }
        if let Some(bytes) = self.store.load(SNAPSHOT_SCALING_KEY).await? {
            let history: Vec<ScalingEvent> = serde_json::from_slice(&bytes)?;
            self.scaler.restore_history(history);
        }
        Ok(())
    }

    async fn persist_state(&self) -> Result<()> {
        Self::persist_snapshot(&self.queue, &self.alerts, &self.scaler, &self.store).await
    }

    async fn persist_snapshot(
        queue: &OperationQueue,
        alerts: &AlertEngine,
        scaler: &AutoScaler,
        store: &Arc<dyn StateStore>,
    ) -> Result<()> {
        let items = serde_json::to_vec(&queue.snapshot_items())?;
        store.save(SNAPSHOT_ITEMS_KEY, &items).await?;
        let alerts_bytes = serde_json::to_vec(&alerts.alerts())?;
        store.save(SNAPSHOT_ALERTS_KEY, &alerts_bytes).await?;
        let history = serde_json::to_vec(&scaler.history())?;
        store.save(SNAPSHOT_SCALING_KEY, &history).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Background loops
    // ------------------------------------------------------------------

    /// Metrics collection tick: publish metrics, refresh worker load,
    /// evaluate alert rules, and persist a snapshot
    #[allow(clippy::too_many_arguments)]
    async fn metrics_loop(
        queue: Arc<OperationQueue>,
        registry: Arc<WorkerRegistry>,
        alerts: Arc<AlertEngine>,
        scaler: Arc<AutoScaler>,
        store: Arc<dyn StateStore>,
        events: broadcast::Sender<QueueEvent>,
        interval_ms: u64,
        mut shutdown: crate::application::worker::ShutdownToken,
    ) {
        info!(interval_ms, "Metrics collector started");
        let mut tick = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let metrics = queue.metrics();
                    registry.set_load(metrics.queue_utilization);
                    let _ = events.send(QueueEvent::MetricsCollected {
                        metrics: metrics.clone(),
                    });
                    alerts.evaluate(&metrics).await;
                    if let Err(e) =
                        Self::persist_snapshot(&queue, &alerts, &scaler, &store).await
                    {
                        error!(error = %e, "Snapshot persistence failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Metrics collector stopped");
                    break;
                }
            }
        }
    }

    /// Cleanup tick: drop terminal items past the retention window
    async fn cleanup_loop(
        queue: Arc<OperationQueue>,
        interval_ms: u64,
        mut shutdown: crate::application::worker::ShutdownToken,
    ) {
        let mut tick = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let removed = queue.cleanup_expired();
                    if removed > 0 {
                        info!(removed, "Expired terminal items cleaned up");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
    }
}
