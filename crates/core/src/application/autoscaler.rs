// Auto-Scaler
//
// Adjusts the enabled worker count from queue utilization against the
// configured thresholds. Each direction has an independent cooldown so
// the pool never oscillates. Every applied attempt is recorded.

use crate::application::queue::OperationQueue;
use crate::application::worker::{ShutdownToken, WorkerRegistry};
use crate::config::ScalingSettings;
use crate::domain::events::QueueEvent;
use crate::domain::worker::{ScaleDirection, ScalingEvent};
use crate::port::TimeProvider;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::interval_at;
use tracing::{debug, info, warn};

/// Bounded scaling history retained for operators and snapshots
const MAX_HISTORY: usize = 100;

/// Decision made by one evaluation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalingDecision {
    None,
    ScaleUp { reason: String },
    ScaleDown { reason: String },
}

struct ScalerState {
    last_scale_up_at: Option<i64>,
    last_scale_down_at: Option<i64>,
    history: Vec<ScalingEvent>,
}

pub struct AutoScaler {
    registry: Arc<WorkerRegistry>,
    queue: Arc<OperationQueue>,
    settings: ScalingSettings,
    time: Arc<dyn TimeProvider>,
    events: tokio::sync::broadcast::Sender<QueueEvent>,
    state: Mutex<ScalerState>,
}

impl AutoScaler {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        queue: Arc<OperationQueue>,
        settings: ScalingSettings,
        time: Arc<dyn TimeProvider>,
        events: tokio::sync::broadcast::Sender<QueueEvent>,
    ) -> Self {
        Self {
            registry,
            queue,
            settings,
            time,
            events,
            state: Mutex::new(ScalerState {
                last_scale_up_at: None,
                last_scale_down_at: None,
                history: Vec::new(),
            }),
        }
    }

    /// Evaluate thresholds against the current pool size
    pub fn evaluate(&self, utilization: f64, enabled: usize) -> ScalingDecision {
        if utilization > self.settings.scale_up_threshold && enabled < self.settings.max_workers {
            ScalingDecision::ScaleUp {
                reason: format!(
                    "utilization {:.2} above threshold {:.2}",
                    utilization, self.settings.scale_up_threshold
                ),
            }
        } else if utilization < self.settings.scale_down_threshold
            && enabled > self.settings.min_workers
        {
            ScalingDecision::ScaleDown {
                reason: format!(
                    "utilization {:.2} below threshold {:.2}",
                    utilization, self.settings.scale_down_threshold
                ),
            }
        } else {
            ScalingDecision::None
        }
    }

    /// One scaling pass over the given utilization.
    ///
    /// Returns the recorded event when an attempt was made; cooldown
    /// suppression returns None without recording.
    pub fn apply(&self, utilization: f64) -> Option<ScalingEvent> {
        let now = self.time.now_millis();
        let enabled = self.registry.enabled_count();

        let (direction, reason) = match self.evaluate(utilization, enabled) {
            ScalingDecision::None => return None,
            ScalingDecision::ScaleUp { reason } => (ScaleDirection::ScaleUp, reason),
            ScalingDecision::ScaleDown { reason } => (ScaleDirection::ScaleDown, reason),
        };

        if !self.cooldown_elapsed(direction, now) {
            debug!(direction = %direction, "Scaling suppressed by cooldown");
            return None;
        }

        let applied = match direction {
            ScaleDirection::ScaleUp => self.registry.enable_one().is_some(),
            ScaleDirection::ScaleDown => self.registry.disable_one().is_some(),
        };
        let to_workers = self.registry.enabled_count();

        let event = ScalingEvent {
            direction,
            from_workers: enabled,
            to_workers,
            reason,
            success: applied,
            timestamp: now,
        };
        self.record(event.clone(), now, direction, applied);
        Some(event)
    }

    /// Scale-up requested by a health-check action; honors the same
    /// cooldown as the periodic pass
    pub fn request_scale_up(&self, reason: &str) -> Option<ScalingEvent> {
        let now = self.time.now_millis();
        if !self.cooldown_elapsed(ScaleDirection::ScaleUp, now) {
            debug!("Requested scale-up suppressed by cooldown");
            return None;
        }
        let from = self.registry.enabled_count();
        if from >= self.settings.max_workers {
            return None;
        }
        let applied = self.registry.enable_one().is_some();
        let event = ScalingEvent {
            direction: ScaleDirection::ScaleUp,
            from_workers: from,
            to_workers: self.registry.enabled_count(),
            reason: reason.to_string(),
            success: applied,
            timestamp: now,
        };
        self.record(event.clone(), now, ScaleDirection::ScaleUp, applied);
        Some(event)
    }

    /// Manual scale request: clamp to [min, max] and step the pool.
    /// Operator-initiated, so it bypasses cooldowns but never the bounds.
    pub fn scale_to(&self, target: usize, reason: &str) -> ScalingEvent {
        let now = self.time.now_millis();
        let clamped = target
            .max(self.settings.min_workers)
            .min(self.settings.max_workers);
        if clamped != target {
            warn!(
                requested = target,
                clamped = clamped,
                "Manual scale target clamped to worker bounds"
            );
        }
        let from = self.registry.enabled_count();

        while self.registry.enabled_count() < clamped {
            if self.registry.enable_one().is_none() {
                break;
            }
        }
        while self.registry.enabled_count() > clamped {
            if self.registry.disable_one().is_none() {
                break;
            }
        }

        let to = self.registry.enabled_count();
        let direction = if to >= from {
            ScaleDirection::ScaleUp
        } else {
            ScaleDirection::ScaleDown
        };
        let event = ScalingEvent {
            direction,
            from_workers: from,
            to_workers: to,
            reason: reason.to_string(),
            success: to == clamped,
            timestamp: now,
        };
        self.record(event.clone(), now, direction, to != from);
        event
    }

    fn cooldown_elapsed(&self, direction: ScaleDirection, now: i64) -> bool {
        let state = self.state.lock().unwrap();
        let (last, cooldown) = match direction {
            ScaleDirection::ScaleUp => (
                state.last_scale_up_at,
                self.settings.scale_up_cooldown_ms,
            ),
            ScaleDirection::ScaleDown => (
                state.last_scale_down_at,
                self.settings.scale_down_cooldown_ms,
            ),
        };
        last.map(|t| now - t >= cooldown).unwrap_or(true)
    }

    fn record(&self, event: ScalingEvent, now: i64, direction: ScaleDirection, applied: bool) {
        {
            let mut state = self.state.lock().unwrap();
            if applied {
                match direction {
                    ScaleDirection::ScaleUp => state.last_scale_up_at = Some(now),
                    ScaleDirection::ScaleDown => state.last_scale_down_at = Some(now),
                }
            }
            state.history.push(event.clone());
            let overflow = state.history.len().saturating_sub(MAX_HISTORY);
            if overflow > 0 {
                state.history.drain(..overflow);
            }
        }
        info!(
            direction = %event.direction,
            from = event.from_workers,
            to = event.to_workers,
            success = event.success,
            reason = %event.reason,
            "Scaling event recorded"
        );
        let _ = self.events.send(QueueEvent::Scaled { event });
    }

    pub fn history(&self) -> Vec<ScalingEvent> {
        self.state.lock().unwrap().history.clone()
    }

    /// Restore persisted scaling history on startup
    pub fn restore_history(&self, history: Vec<ScalingEvent>) {
        let mut state = self.state.lock().unwrap();
        state.history = history;
        let overflow = state.history.len().saturating_sub(MAX_HISTORY);
        if overflow > 0 {
            state.history.drain(..overflow);
        }
    }

    /// Periodic scaling loop (spawned by the manager)
    pub async fn run(self: Arc<Self>, mut shutdown: ShutdownToken) {
        info!(
            interval_ms = self.settings.interval_ms,
            "Auto-scaler started"
        );
        // First evaluation waits a full interval; scaling an empty pool
        // at startup would only fight the configured initial_workers
        let period = Duration::from_millis(self.settings.interval_ms);
        let mut tick = interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let utilization = self.queue.metrics().queue_utilization;
                    self.apply(utilization);
                }
                _ = shutdown.wait() => {
                    info!("Auto-scaler stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry::RetryEvaluator;
    use crate::application::scheduler::PriorityScheduler;
    use crate::config::QueueSettings;
    use crate::domain::retry::RetryPolicy;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::time_provider::mocks::MockTimeProvider;
    use tokio::sync::broadcast;

    struct Fixture {
        scaler: AutoScaler,
        registry: Arc<WorkerRegistry>,
        time: Arc<MockTimeProvider>,
    }

    fn fixture(settings: ScalingSettings) -> Fixture {
        let time = Arc::new(MockTimeProvider::new(1_000_000));
        let registry = Arc::new(WorkerRegistry::new(&settings));
        let (events, _) = broadcast::channel(64);
        let queue = Arc::new(OperationQueue::new(
            QueueSettings::default(),
            PriorityScheduler::new(Vec::new()),
            RetryEvaluator::new(RetryPolicy::default()),
            time.clone(),
            Arc::new(SequentialIdProvider::new("op")),
            events.clone(),
        ));
        let scaler = AutoScaler::new(registry.clone(), queue, settings, time.clone(), events);
        Fixture {
            scaler,
            registry,
            time,
        }
    }

    fn settings() -> ScalingSettings {
        ScalingSettings {
            min_workers: 1,
            max_workers: 5,
            initial_workers: 2,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.2,
            scale_up_cooldown_ms: 10_000,
            scale_down_cooldown_ms: 10_000,
            interval_ms: 10_000,
        }
    }

    #[test]
    fn test_sustained_high_utilization_scales_one_per_interval() {
        let f = fixture(settings());
        assert_eq!(f.registry.enabled_count(), 2);

        // One scale_up per interval until max_workers, none beyond
        for expected in [3usize, 4, 5] {
            let event = f.scaler.apply(0.9).expect("scale attempt expected");
            assert_eq!(event.direction, ScaleDirection::ScaleUp);
            assert!(event.success);
            assert_eq!(f.registry.enabled_count(), expected);
            f.time.advance(10_000);
        }
        assert!(f.scaler.apply(0.9).is_none());
        assert_eq!(f.registry.enabled_count(), 5);
    }

    #[test]
    fn test_cooldown_suppresses_same_direction() {
        let f = fixture(settings());
        assert!(f.scaler.apply(0.9).is_some());
        // Still inside the cooldown window
        f.time.advance(5_000);
        assert!(f.scaler.apply(0.9).is_none());
        assert_eq!(f.registry.enabled_count(), 3);

        f.time.advance(5_000);
        assert!(f.scaler.apply(0.9).is_some());
        assert_eq!(f.registry.enabled_count(), 4);
    }

    #[test]
    fn test_independent_cooldowns_per_direction() {
        let f = fixture(settings());
        assert!(f.scaler.apply(0.9).is_some());
        assert_eq!(f.registry.enabled_count(), 3);

        // Scale-down is not blocked by the recent scale-up
        f.time.advance(1_000);
        let event = f.scaler.apply(0.1).expect("scale down expected");
        assert_eq!(event.direction, ScaleDirection::ScaleDown);
        assert_eq!(f.registry.enabled_count(), 2);
    }

    #[test]
    fn test_worker_count_stays_within_bounds() {
        let f = fixture(settings());
        for _ in 0..20 {
            f.scaler.apply(0.9);
            f.time.advance(10_000);
        }
        assert_eq!(f.registry.enabled_count(), 5);

        for _ in 0..20 {
            f.scaler.apply(0.0);
            f.time.advance(10_000);
        }
        assert_eq!(f.registry.enabled_count(), 1);
    }

    #[test]
    fn test_manual_scale_clamps_to_bounds() {
        let f = fixture(settings());
        let event = f.scaler.scale_to(50, "manual");
        assert_eq!(event.to_workers, 5);
        assert!(event.success);

        let event = f.scaler.scale_to(0, "manual");
        assert_eq!(event.to_workers, 1);
    }

    #[test]
    fn test_history_is_bounded_and_recorded() {
        let f = fixture(settings());
        f.scaler.apply(0.9);
        f.time.advance(10_000);
        f.scaler.apply(0.9);
        assert_eq!(f.scaler.history().len(), 2);
    }
}
