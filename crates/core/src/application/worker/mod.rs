// Worker Pool - dispatch execution loops over logical slots

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::queue::{DispatchGate, OperationQueue};
use crate::config::{DispatchMode, DispatchSettings, QueueSettings, ScalingSettings};
use crate::domain::operation::ErrorClass;
use crate::domain::worker::{Worker, WorkerId};
use crate::error::Result;
use crate::port::{ResourceProbe, SyncExecutor, TimeProvider};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Fixed registry of worker slots.
///
/// Slots are allocated once for `max_workers`; scaling toggles the
/// enabled flag and the registry itself upholds the
/// `min_workers <= enabled <= max_workers` invariant.
pub struct WorkerRegistry {
    slots: Mutex<Vec<Worker>>,
    min_workers: usize,
}

impl WorkerRegistry {
    pub fn new(settings: &ScalingSettings) -> Self {
        let slots = (0..settings.max_workers)
            .map(|n| {
                let mut worker = Worker::new(
                    format!("worker-{}", n + 1),
                    DEFAULT_WORKER_CAPACITY,
                    DEFAULT_WORKER_WEIGHT,
                );
                worker.enabled = n < settings.initial_workers;
                worker
            })
            .collect();
        Self {
            slots: Mutex::new(slots),
            min_workers: settings.min_workers,
        }
    }

    pub fn total(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn enabled_count(&self) -> usize {
        self.slots.lock().unwrap().iter().filter(|w| w.enabled).count()
    }

    pub fn is_enabled(&self, index: usize) -> bool {
        self.slots
            .lock()
            .unwrap()
            .get(index)
            .map(|w| w.enabled)
            .unwrap_or(false)
    }

    /// Enable the first disabled slot; None when already at max
    pub fn enable_one(&self) -> Option<WorkerId> {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.iter_mut().find(|w| !w.enabled)?;
        slot.enabled = true;
        info!(worker_id = %slot.id, "Worker enabled");
        Some(slot.id.clone())
    }

    /// Disable the last enabled slot; None at the min-workers floor
    pub fn disable_one(&self) -> Option<WorkerId> {
        let mut slots = self.slots.lock().unwrap();
        let enabled = slots.iter().filter(|w| w.enabled).count();
        if enabled <= self.min_workers {
            return None;
        }
        let slot = slots.iter_mut().rev().find(|w| w.enabled)?;
        slot.enabled = false;
        info!(worker_id = %slot.id, "Worker disabled");
        Some(slot.id.clone())
    }

    /// Derived load published on every metrics tick
    pub fn set_load(&self, utilization: f64) {
        for worker in self.slots.lock().unwrap().iter_mut() {
            worker.load = if worker.enabled { utilization } else { 0.0 };
        }
    }

    pub fn snapshot(&self) -> Vec<Worker> {
        self.slots.lock().unwrap().clone()
    }
}

/// One dispatch loop bound to a worker slot
pub struct SyncWorker {
    slot_index: usize,
    queue: Arc<OperationQueue>,
    executor: Arc<dyn SyncExecutor>,
    probe: Arc<dyn ResourceProbe>,
    gate: Arc<DispatchGate>,
    registry: Arc<WorkerRegistry>,
    time: Arc<dyn TimeProvider>,
    queue_settings: QueueSettings,
    dispatch: DispatchSettings,
}

impl SyncWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        slot_index: usize,
        queue: Arc<OperationQueue>,
        executor: Arc<dyn SyncExecutor>,
        probe: Arc<dyn ResourceProbe>,
        gate: Arc<DispatchGate>,
        registry: Arc<WorkerRegistry>,
        time: Arc<dyn TimeProvider>,
        queue_settings: QueueSettings,
        dispatch: DispatchSettings,
    ) -> Self {
        Self {
            slot_index,
            queue,
            executor,
            probe,
            gate,
            registry,
            time,
            queue_settings,
            dispatch,
        }
    }

    /// Run the dispatch loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(slot = self.slot_index, "Worker started");
        let mut last_drain = self.time.now_millis();

        loop {
            if shutdown.is_shutdown() {
                info!(slot = self.slot_index, "Worker shutting down");
                break;
            }
            if !self.registry.is_enabled(self.slot_index) {
                tokio::select! {
                    _ = sleep(DISABLED_POLL_DURATION) => {},
                    _ = shutdown.wait() => break,
                }
                continue;
            }

            let step = match &self.dispatch.mode {
                DispatchMode::Immediate => self.process_next().await,
                DispatchMode::Scheduled { interval_ms } => {
                    let now = self.time.now_millis();
                    if now - last_drain < *interval_ms as i64 {
                        tokio::select! {
                            _ = sleep(GATED_SLEEP_DURATION) => {},
                            _ = shutdown.wait() => break,
                        }
                        continue;
                    }
                    last_drain = now;
                    self.process_next().await
                }
                DispatchMode::Batch {
                    batch_size,
                    processing_interval_ms,
                } => {
                    let now = self.time.now_millis();
                    let interval_due = now - last_drain >= *processing_interval_ms as i64;
                    let batch_ready = self.queue.eligible_count() >= *batch_size;
                    if !interval_due && !batch_ready {
                        tokio::select! {
                            _ = sleep(GATED_SLEEP_DURATION) => {},
                            _ = shutdown.wait() => break,
                        }
                        continue;
                    }
                    last_drain = now;
                    self.drain_batch(*batch_size).await
                }
            };

            match step {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = sleep(IDLE_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!(slot = self.slot_index, "Worker interrupted during idle");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!(slot = self.slot_index, error = %e, "Worker error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }
        info!(slot = self.slot_index, "Worker stopped");
        Ok(())
    }

    /// Drain up to batch_size items; stops early when the queue empties
    async fn drain_batch(&self, batch_size: usize) -> Result<bool> {
        let mut processed_any = false;
        for _ in 0..batch_size {
            if !self.process_next().await? {
                break;
            }
            processed_any = true;
        }
        Ok(processed_any)
    }

    /// Process the next eligible item (returns true when one was handled)
    pub async fn process_next(&self) -> Result<bool> {
        if self.gate.is_paused() {
            return Ok(false);
        }

        // Gate on system readings before pulling work
        let readings = self.probe.read().await;
        if readings.cpu_pct > CPU_THROTTLE_THRESHOLD {
            warn!(
                cpu_pct = %readings.cpu_pct,
                threshold = %CPU_THROTTLE_THRESHOLD,
                "System throttling: CPU over threshold, skipping dispatch"
            );
            return Ok(false);
        }
        if self.dispatch.network_aware && !readings.network_online {
            debug!("Network offline, dispatch paused");
            return Ok(false);
        }

        if !self
            .gate
            .try_acquire(self.time.now_millis(), self.queue.error_rate())
        {
            return Ok(false);
        }

        let Some(item) = self.queue.next_eligible() else {
            return Ok(false);
        };

        // Cooperative cancellation: observe the flag before executing
        if self.queue.is_cancel_requested(&item.id) {
            self.queue.record_cancelled(&item.id)?;
            return Ok(true);
        }

        info!(
            item_id = %item.id,
            kind = %item.operation.kind,
            slot = self.slot_index,
            "Executing operation"
        );

        // Panic isolation: a panicking executor fails the item, not the
        // process
        let executor = Arc::clone(&self.executor);
        let operation = item.operation.clone();
        let mut handle = tokio::spawn(async move { executor.execute(&operation).await });

        let timeout = Duration::from_millis(self.queue_settings.operation_timeout_ms);
        match tokio::time::timeout(timeout, &mut handle).await {
            Err(_elapsed) => {
                handle.abort();
                warn!(
                    item_id = %item.id,
                    timeout_ms = %self.queue_settings.operation_timeout_ms,
                    "Operation timed out"
                );
                self.queue.record_failure(
                    &item.id,
                    ErrorClass::Timeout,
                    &format!(
                        "operation timed out after {}ms",
                        self.queue_settings.operation_timeout_ms
                    ),
                )?;
            }
            Ok(Err(join_err)) => {
                // Panicked or aborted: not safe to assume anything about
                // the transport state, fail terminally
                error!(item_id = %item.id, error = %join_err, "Executor panicked");
                self.queue.fail_terminal(
                    &item.id,
                    &format!("executor panicked: {}", join_err),
                )?;
            }
            Ok(Ok(outcome)) => {
                // Observe the cancel flag again: an outcome that raced a
                // cancellation is discarded
                if self.queue.is_cancel_requested(&item.id) {
                    self.queue.record_cancelled(&item.id)?;
                } else {
                    match outcome {
                        Ok(()) => self.queue.record_success(&item.id)?,
                        Err(sync_err) => self.queue.record_failure(
                            &item.id,
                            sync_err.class,
                            &sync_err.message,
                        )?,
                    }
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScalingSettings;

    fn settings() -> ScalingSettings {
        ScalingSettings {
            min_workers: 1,
            max_workers: 4,
            initial_workers: 2,
            ..ScalingSettings::default()
        }
    }

    #[test]
    fn test_registry_initial_enabled() {
        let registry = WorkerRegistry::new(&settings());
        assert_eq!(registry.total(), 4);
        assert_eq!(registry.enabled_count(), 2);
        assert!(registry.is_enabled(0));
        assert!(registry.is_enabled(1));
        assert!(!registry.is_enabled(2));
    }

    #[test]
    fn test_registry_enable_disable_within_bounds() {
        let registry = WorkerRegistry::new(&settings());

        assert!(registry.enable_one().is_some());
        assert!(registry.enable_one().is_some());
        assert_eq!(registry.enabled_count(), 4);
        // At max: every slot is enabled
        assert!(registry.enable_one().is_none());

        assert!(registry.disable_one().is_some());
        assert!(registry.disable_one().is_some());
        assert!(registry.disable_one().is_some());
        assert_eq!(registry.enabled_count(), 1);
        // At the min-workers floor
        assert!(registry.disable_one().is_none());
    }

    #[test]
    fn test_registry_load_published_to_enabled_slots() {
        let registry = WorkerRegistry::new(&settings());
        registry.set_load(0.75);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].load, 0.75);
        assert_eq!(snapshot[3].load, 0.0);
    }
}
