// Operation Queue - admission, deduplication, dispatch bookkeeping,
// retry bookkeeping, metrics

pub mod metrics;
pub mod throttle;

pub use metrics::{MetricsWindow, QueueMetrics};
pub use throttle::DispatchGate;

use crate::application::retry::{RetryDecision, RetryEvaluator};
use crate::application::scheduler::PriorityScheduler;
use crate::config::QueueSettings;
use crate::domain::events::QueueEvent;
use crate::domain::operation::{
    ErrorClass, ItemId, ItemStatus, Operation, Priority, QueueItem,
};
use crate::error::{QueueError, Result};
use crate::port::{IdProvider, TimeProvider};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Behavior when an enqueue hits an id that is already pending/processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfActive {
    /// Error with DuplicateActive
    Reject,
    /// Idempotent re-enqueue: return the existing id
    ReturnExisting,
}

/// Options accepted at admission
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    /// Caller-supplied id; generated when absent
    pub id: Option<ItemId>,
    pub priority: Priority,
    pub dependencies: Vec<ItemId>,
    pub metadata: BTreeMap<String, String>,
    pub if_active: IfActive,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            id: None,
            priority: Priority::default(),
            dependencies: Vec::new(),
            metadata: BTreeMap::new(),
            if_active: IfActive::Reject,
        }
    }
}

/// Bulk removal filter
#[derive(Debug, Clone, Default)]
pub struct ClearOptions {
    /// Statuses to remove; Processing items are never removed
    pub statuses: Vec<ItemStatus>,
    /// Only items created more than this many ms ago
    pub older_than_ms: Option<i64>,
}

/// Size plus a metrics snapshot
#[derive(Debug, Clone)]
pub struct QueueStatus {
    pub size: usize,
    pub metrics: QueueMetrics,
}

struct QueueState {
    items: HashMap<ItemId, QueueItem>,
    next_seq: u64,
    in_flight: usize,
    window: MetricsWindow,
}

/// The operation queue.
///
/// All state lives behind one mutex; methods lock briefly and never
/// await while holding it. `size` counts active (pending + processing)
/// items; terminal items are retained for history until the cleanup pass
/// removes them and do not count against capacity.
pub struct OperationQueue {
    state: Mutex<QueueState>,
    settings: QueueSettings,
    scheduler: PriorityScheduler,
    retry: RetryEvaluator,
    time: Arc<dyn TimeProvider>,
    ids: Arc<dyn IdProvider>,
    events: broadcast::Sender<QueueEvent>,
}

impl OperationQueue {
    pub fn new(
        settings: QueueSettings,
        scheduler: PriorityScheduler,
        retry: RetryEvaluator,
        time: Arc<dyn TimeProvider>,
        ids: Arc<dyn IdProvider>,
        events: broadcast::Sender<QueueEvent>,
    ) -> Self {
        let window = MetricsWindow::new(settings.metrics_window_ms);
        Self {
            state: Mutex::new(QueueState {
                items: HashMap::new(),
                next_seq: 1,
                in_flight: 0,
                window,
            }),
            settings,
            scheduler,
            retry,
            time,
            ids,
            events,
        }
    }

    fn emit(&self, event: QueueEvent) {
        // No receivers is fine; events are best-effort fan-out
        let _ = self.events.send(event);
    }

    /// Admit one operation.
    ///
    /// Errors with `CapacityExceeded` at `max_queue_size` active items,
    /// and with `DuplicateActive` when the id is already in flight and
    /// the options reject idempotent re-enqueue.
    pub fn enqueue(&self, operation: Operation, options: EnqueueOptions) -> Result<ItemId> {
        let now = self.time.now_millis();
        let mut state = self.state.lock().unwrap();

        if let Some(id) = &options.id {
            if let Some(existing) = state.items.get(id) {
                if existing.status.is_active() {
                    return match options.if_active {
                        IfActive::Reject => Err(QueueError::DuplicateActive(id.clone())),
                        IfActive::ReturnExisting => {
                            debug!(item_id = %id, "Idempotent re-enqueue of active item");
                            Ok(id.clone())
                        }
                    };
                }
            }
        }

        let active = Self::active_count(&state.items);
        if active >= self.settings.max_queue_size {
            warn!(
                size = active,
                max = self.settings.max_queue_size,
                "Enqueue rejected: queue at capacity"
            );
            return Err(QueueError::CapacityExceeded {
                size: active,
                max: self.settings.max_queue_size,
            });
        }

        let id = options.id.unwrap_or_else(|| self.ids.generate_id());
        let seq = state.next_seq;
        state.next_seq += 1;

        let mut item = QueueItem::new(id.clone(), operation, options.priority, now, seq);
        item.dependencies = options.dependencies;
        item.metadata = options.metadata;
        item.priority = self.scheduler.admission_priority(&item);

        info!(
            item_id = %item.id,
            kind = %item.operation.kind,
            priority = %item.priority,
            "Operation enqueued"
        );

        // A terminal record under the same id is superseded by the new item
        state.items.insert(id.clone(), item.clone());
        drop(state);

        self.emit(QueueEvent::Enqueued { item });
        Ok(id)
    }

    /// Remove a pending item from the queue entirely.
    /// No-op (false) when the item is processing or absent.
    pub fn dequeue(&self, id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let removable = state
            .items
            .get(id)
            .map(|item| item.status == ItemStatus::Pending)
            .unwrap_or(false);
        if removable {
            state.items.remove(id);
            info!(item_id = %id, "Item dequeued");
        }
        removable
    }

    /// Force a failed item back to pending, eligible immediately,
    /// bypassing the normal backoff wait.
    pub fn retry(&self, id: &str) -> bool {
        let now = self.time.now_millis();
        let mut state = self.state.lock().unwrap();
        let Some(item) = state.items.get_mut(id) else {
            return false;
        };
        if item.status != ItemStatus::Failed {
            return false;
        }
        item.requeue(now);
        item.finished_at = None;
        let snapshot = item.clone();
        drop(state);

        info!(item_id = %id, "Failed item forced back to pending");
        self.emit(QueueEvent::Retried {
            item: snapshot,
            delay_ms: 0,
        });
        true
    }

    /// Cancel an item.
    ///
    /// Pending items transition to Cancelled; processing items get a
    /// cancellation flag the executor observes cooperatively (no
    /// preemption).
    pub fn cancel(&self, id: &str) -> bool {
        let now = self.time.now_millis();
        let mut state = self.state.lock().unwrap();
        let Some(item) = state.items.get_mut(id) else {
            return false;
        };
        match item.status {
            ItemStatus::Pending => {
                // Checked transition cannot fail for a pending item
                let _ = item.cancel(now);
                item.finished_at = Some(now);
                let snapshot = item.clone();
                let failed = Self::fail_dependents(&mut state, id, now);
                drop(state);

                info!(item_id = %id, "Pending item cancelled");
                self.emit(QueueEvent::Cancelled { item: snapshot });
                for dep in failed {
                    self.emit(QueueEvent::Failed { item: dep });
                }
                true
            }
            ItemStatus::Processing => {
                item.cancel_requested = true;
                info!(item_id = %id, "Cancellation requested for in-flight item");
                true
            }
            _ => false,
        }
    }

    pub fn is_cancel_requested(&self, id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .items
            .get(id)
            .map(|item| item.cancel_requested)
            .unwrap_or(false)
    }

    /// Pull the next dispatchable item and mark it Processing.
    ///
    /// Respects the in-flight ceiling; ordering and dependency gating
    /// are delegated to the scheduler.
    pub fn next_eligible(&self) -> Option<QueueItem> {
        let now = self.time.now_millis();
        let mut state = self.state.lock().unwrap();
        if state.in_flight >= self.settings.max_concurrent_operations {
            return None;
        }
        let id = self.scheduler.next_eligible(&state.items, now)?;
        let item = state.items.get_mut(&id)?;
        // Checked transition; the scheduler only returns pending items
        item.start(now).ok()?;
        let snapshot = item.clone();
        state.in_flight += 1;
        debug!(item_id = %id, "Item dispatched");
        Some(snapshot)
    }

    /// How many pending items are dispatchable right now
    pub fn eligible_count(&self) -> usize {
        let now = self.time.now_millis();
        let state = self.state.lock().unwrap();
        self.scheduler.eligible_count(&state.items, now)
    }

    /// Record a successful execution outcome
    pub fn record_success(&self, id: &str) -> Result<()> {
        let now = self.time.now_millis();
        let mut state = self.state.lock().unwrap();
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        item.complete(now)?;
        let duration = now - item.started_at.unwrap_or(now);
        let snapshot = item.clone();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.window.record_completion(now, duration.max(0));
        drop(state);

        info!(item_id = %id, duration_ms = %duration, "Operation completed");
        self.emit(QueueEvent::Completed { item: snapshot });
        Ok(())
    }

    /// Record a failed execution outcome.
    ///
    /// Consults the retry evaluator: a permitted retry returns the item
    /// to pending with backoff; exhaustion (or a cancellation observed
    /// mid-flight) terminalizes it. Terminal failure cascades to pending
    /// dependents.
    pub fn record_failure(&self, id: &str, class: ErrorClass, message: &str) -> Result<()> {
        let now = self.time.now_millis();
        let mut state = self.state.lock().unwrap();
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if item.status != ItemStatus::Processing {
            return Err(QueueError::Domain(
                crate::domain::DomainError::InvalidStateTransition {
                    from: item.status.to_string(),
                    to: "FAILED".to_string(),
                },
            ));
        }

        state.in_flight = state.in_flight.saturating_sub(1);
        let item = state.items.get_mut(id).expect("checked above");

        if item.cancel_requested {
            item.status = ItemStatus::Cancelled;
            item.finished_at = Some(now);
            let snapshot = item.clone();
            let failed = Self::fail_dependents(&mut state, id, now);
            drop(state);
            info!(item_id = %id, "Failure discarded, item was cancel-requested");
            self.emit(QueueEvent::Cancelled { item: snapshot });
            for dep in failed {
                self.emit(QueueEvent::Failed { item: dep });
            }
            return Ok(());
        }

        match self.retry.evaluate(class, item.attempts, &item.id) {
            RetryDecision::Retry(delay_ms) => {
                item.attempts += 1;
                item.last_error = Some(message.to_string());
                item.requeue(now + delay_ms);
                let snapshot = item.clone();
                drop(state);

                info!(
                    item_id = %id,
                    attempt = %snapshot.attempts,
                    delay_ms = %delay_ms,
                    error_class = %class,
                    "Operation rescheduled after failure"
                );
                self.emit(QueueEvent::Retried {
                    item: snapshot,
                    delay_ms,
                });
            }
            RetryDecision::Exhausted => {
                item.fail(now, message);
                let snapshot = item.clone();
                state.window.record_failure();
                let failed_deps = Self::fail_dependents(&mut state, id, now);
                drop(state);

                warn!(
                    item_id = %id,
                    error_class = %class,
                    "Operation failed terminally"
                );
                self.emit(QueueEvent::Failed { item: snapshot });
                for dep in failed_deps {
                    self.emit(QueueEvent::Failed { item: dep });
                }
            }
        }
        Ok(())
    }

    /// Terminally fail an in-flight item without consulting the retry
    /// policy. Used for panicked or aborted executions, where the
    /// transport state is unknown and a blind retry is not safe.
    pub fn fail_terminal(&self, id: &str, message: &str) -> Result<()> {
        let now = self.time.now_millis();
        let mut state = self.state.lock().unwrap();
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if item.status != ItemStatus::Processing {
            return Err(QueueError::Domain(
                crate::domain::DomainError::InvalidStateTransition {
                    from: item.status.to_string(),
                    to: "FAILED".to_string(),
                },
            ));
        }
        item.fail(now, message);
        let snapshot = item.clone();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.window.record_failure();
        let failed_deps = Self::fail_dependents(&mut state, id, now);
        drop(state);

        warn!(item_id = %id, "Operation failed terminally without retry");
        self.emit(QueueEvent::Failed { item: snapshot });
        for dep in failed_deps {
            self.emit(QueueEvent::Failed { item: dep });
        }
        Ok(())
    }

    /// Record that a cancel-requested item finished without a usable
    /// outcome (cooperative cancellation observed by the worker)
    pub fn record_cancelled(&self, id: &str) -> Result<()> {
        let now = self.time.now_millis();
        let mut state = self.state.lock().unwrap();
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if item.status != ItemStatus::Processing {
            return Err(QueueError::Domain(
                crate::domain::DomainError::InvalidStateTransition {
                    from: item.status.to_string(),
                    to: "CANCELLED".to_string(),
                },
            ));
        }
        item.status = ItemStatus::Cancelled;
        item.finished_at = Some(now);
        let snapshot = item.clone();
        state.in_flight = state.in_flight.saturating_sub(1);
        let failed = Self::fail_dependents(&mut state, id, now);
        drop(state);

        info!(item_id = %id, "In-flight item cancelled cooperatively");
        self.emit(QueueEvent::Cancelled { item: snapshot });
        for dep in failed {
            self.emit(QueueEvent::Failed { item: dep });
        }
        Ok(())
    }

    /// Terminally fail every pending item depending (transitively) on a
    /// terminally failed or cancelled item. Returns the failed snapshots.
    fn fail_dependents(state: &mut QueueState, root: &str, now: i64) -> Vec<QueueItem> {
        let mut failed = Vec::new();
        let mut frontier = vec![root.to_string()];
        while let Some(dead) = frontier.pop() {
            let dependents: Vec<String> = state
                .items
                .values()
                .filter(|item| {
                    item.status == ItemStatus::Pending
                        && item.dependencies.iter().any(|d| d == &dead)
                })
                .map(|item| item.id.clone())
                .collect();
            for dep_id in dependents {
                if let Some(item) = state.items.get_mut(&dep_id) {
                    item.fail(now, format!("dependency {} did not complete", dead));
                    failed.push(item.clone());
                    frontier.push(dep_id);
                }
            }
        }
        failed
    }

    /// Cheap accessor for adaptive throttling; avoids the full metrics
    /// snapshot on the dispatch path
    pub fn error_rate(&self) -> f64 {
        self.state.lock().unwrap().window.error_rate()
    }

    /// Queue size plus a fresh metrics snapshot
    pub fn status(&self) -> QueueStatus {
        let metrics = self.metrics();
        QueueStatus {
            size: metrics.size,
            metrics,
        }
    }

    pub fn metrics(&self) -> QueueMetrics {
        let now = self.time.now_millis();
        let mut state = self.state.lock().unwrap();
        let size = Self::active_count(&state.items);
        let memory_usage_bytes = state
            .items
            .values()
            .map(|item| serde_json::to_vec(item).map(|v| v.len()).unwrap_or(0))
            .sum();
        let in_flight = state.in_flight;
        let completed_total = state.window.completed_total;
        let failed_total = state.window.failed_total;
        let throughput = state.window.throughput(now);
        let average_processing_time_ms = state.window.average_processing_time_ms(now);
        let error_rate = state.window.error_rate();

        QueueMetrics {
            size,
            queue_utilization: size as f64 / self.settings.max_queue_size as f64,
            throughput,
            error_rate,
            average_processing_time_ms,
            memory_usage_bytes,
            completed_total,
            failed_total,
            in_flight,
        }
    }

    /// Bulk removal filtered by status and age. Processing items are
    /// never removed.
    pub fn clear(&self, options: &ClearOptions) -> usize {
        let now = self.time.now_millis();
        let mut state = self.state.lock().unwrap();
        let before = state.items.len();
        state.items.retain(|_, item| {
            if item.status == ItemStatus::Processing {
                return true;
            }
            if !options.statuses.is_empty() && !options.statuses.contains(&item.status) {
                return true;
            }
            if let Some(min_age) = options.older_than_ms {
                if now - item.created_at < min_age {
                    return true;
                }
            }
            false
        });
        let removed = before - state.items.len();
        if removed > 0 {
            info!(removed = removed, "Queue cleared");
        }
        removed
    }

    /// Cleanup pass: drop terminal items past the retention window
    pub fn cleanup_expired(&self) -> usize {
        self.clear(&ClearOptions {
            statuses: vec![
                ItemStatus::Completed,
                ItemStatus::Cancelled,
                ItemStatus::Failed,
            ],
            older_than_ms: Some(self.settings.completed_retention_ms),
        })
    }

    /// Replace a set of pending items with one coalesced item (batch
    /// optimization). The merged item keeps the earliest eligibility of
    /// the originals.
    pub fn coalesce_pending(
        &self,
        ids: &[ItemId],
        operation: Operation,
        priority: Priority,
        dependencies: Vec<ItemId>,
        metadata: BTreeMap<String, String>,
    ) -> Result<ItemId> {
        let now = self.time.now_millis();
        let mut state = self.state.lock().unwrap();

        // All originals must still be pending; bail out otherwise
        for id in ids {
            match state.items.get(id) {
                Some(item) if item.status == ItemStatus::Pending => {}
                _ => {
                    return Err(QueueError::Internal(format!(
                        "coalesce aborted: {} is no longer pending",
                        id
                    )))
                }
            }
        }

        let earliest = ids
            .iter()
            .filter_map(|id| state.items.get(id))
            .map(|item| item.scheduled_at)
            .min()
            .unwrap_or(now);
        for id in ids {
            state.items.remove(id);
        }

        let merged_id = self.ids.generate_id();
        let seq = state.next_seq;
        state.next_seq += 1;
        let mut item = QueueItem::new(merged_id.clone(), operation, priority, now, seq);
        item.scheduled_at = earliest;
        item.dependencies = dependencies;
        item.metadata = metadata;
        let snapshot = item.clone();
        state.items.insert(merged_id.clone(), item);
        drop(state);

        info!(
            merged = ids.len(),
            item_id = %merged_id,
            "Pending items coalesced"
        );
        self.emit(QueueEvent::Enqueued { item: snapshot });
        Ok(merged_id)
    }

    pub fn get(&self, id: &str) -> Option<QueueItem> {
        self.state.lock().unwrap().items.get(id).cloned()
    }

    pub fn count_by_status(&self, status: ItemStatus) -> usize {
        self.state
            .lock()
            .unwrap()
            .items
            .values()
            .filter(|item| item.status == status)
            .count()
    }

    /// Pending items matching a filter, for the batch optimizer
    pub fn pending_matching<F>(&self, filter: F) -> Vec<QueueItem>
    where
        F: Fn(&QueueItem) -> bool,
    {
        self.state
            .lock()
            .unwrap()
            .items
            .values()
            .filter(|item| item.status == ItemStatus::Pending && filter(item))
            .cloned()
            .collect()
    }

    /// All retained items, for the persistence snapshot
    pub fn snapshot_items(&self) -> Vec<QueueItem> {
        self.state.lock().unwrap().items.values().cloned().collect()
    }

    /// Restore a persisted snapshot. Items captured mid-processing are
    /// returned to pending: the execution outcome of a crashed run is
    /// unknown and the transport contract is at-least-once.
    pub fn restore_items(&self, items: Vec<QueueItem>) {
        let now = self.time.now_millis();
        let mut state = self.state.lock().unwrap();
        let mut restored = 0usize;
        let mut requeued = 0usize;
        for mut item in items {
            if item.status == ItemStatus::Processing {
                item.requeue(now);
                requeued += 1;
            }
            state.next_seq = state.next_seq.max(item.seq + 1);
            state.items.insert(item.id.clone(), item);
            restored += 1;
        }
        state.in_flight = 0;
        info!(restored, requeued, "Queue snapshot restored");
    }

    fn active_count(items: &HashMap<ItemId, QueueItem>) -> usize {
        items.values().filter(|i| i.status.is_active()).count()
    }
}
