// Health Check Runner
//
// Periodic composite assessment across memory/storage/network/queue/sync.
// Results are produced fresh each cycle and supersede the previous set.

use crate::application::autoscaler::AutoScaler;
use crate::application::queue::{DispatchGate, OperationQueue};
use crate::application::worker::ShutdownToken;
use crate::config::{CheckAction, HealthSettings};
use crate::domain::events::QueueEvent;
use crate::domain::health::{CheckStatus, HealthCheckResult, HealthState, HealthStatus};
use crate::port::{ResourceProbe, TimeProvider};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{info, warn};

pub struct HealthRunner {
    probe: Arc<dyn ResourceProbe>,
    queue: Arc<OperationQueue>,
    gate: Arc<DispatchGate>,
    scaler: Arc<AutoScaler>,
    settings: HealthSettings,
    time: Arc<dyn TimeProvider>,
    events: broadcast::Sender<QueueEvent>,
    last: Mutex<Option<HealthStatus>>,
}

impl HealthRunner {
    pub fn new(
        probe: Arc<dyn ResourceProbe>,
        queue: Arc<OperationQueue>,
        gate: Arc<DispatchGate>,
        scaler: Arc<AutoScaler>,
        settings: HealthSettings,
        time: Arc<dyn TimeProvider>,
        events: broadcast::Sender<QueueEvent>,
    ) -> Self {
        Self {
            probe,
            queue,
            gate,
            scaler,
            settings,
            time,
            events,
            last: Mutex::new(None),
        }
    }

    /// Latest composite assessment, if a cycle has run
    pub fn current(&self) -> Option<HealthStatus> {
        self.last.lock().unwrap().clone()
    }

    /// Run one full check cycle and apply configured check actions
    pub async fn run_cycle(&self) -> HealthStatus {
        let now = self.time.now_millis();
        let checks = &self.settings.checks;
        let mut results = Vec::with_capacity(5);

        // Probe-backed checks share one read, bounded by the check timeout
        let timeout = Duration::from_millis(self.settings.check_timeout_ms);
        match tokio::time::timeout(timeout, self.probe.read()).await {
            Ok(readings) => {
                results.push(Self::result("memory", readings.memory_pct, checks.memory.threshold, now));
                results.push(Self::result(
                    "storage",
                    readings.storage_pct,
                    checks.storage.threshold,
                    now,
                ));
                // Offline networks fail outright; online ones are judged
                // on latency
                let network_value = if readings.network_online {
                    readings.network_latency_ms.unwrap_or(0.0)
                } else {
                    checks.network.threshold * 2.0
                };
                results.push(Self::result(
                    "network",
                    network_value,
                    checks.network.threshold,
                    now,
                ));
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.settings.check_timeout_ms,
                    "Resource probe timed out, marking probe-backed checks failed"
                );
                for id in ["memory", "storage", "network"] {
                    let threshold = match id {
                        "memory" => checks.memory.threshold,
                        "storage" => checks.storage.threshold,
                        _ => checks.network.threshold,
                    };
                    results.push(HealthCheckResult {
                        id: id.to_string(),
                        status: CheckStatus::Fail,
                        value: -1.0,
                        threshold,
                        timestamp: now,
                    });
                }
            }
        }

        let metrics = self.queue.metrics();
        results.push(Self::result(
            "queue",
            metrics.queue_utilization * 100.0,
            checks.queue.threshold,
            now,
        ));
        results.push(Self::result(
            "sync",
            metrics.error_rate * 100.0,
            checks.sync.threshold,
            now,
        ));

        let recommendations = Self::recommendations(&results);
        let status = HealthStatus::aggregate(results, recommendations, now);

        let changed = {
            let mut last = self.last.lock().unwrap();
            let changed = last
                .as_ref()
                .map(|prev| prev.status != status.status)
                .unwrap_or(true);
            *last = Some(status.clone());
            changed
        };
        if changed {
            info!(
                status = %status.status,
                score = %status.score,
                "Health status changed"
            );
            let _ = self.events.send(QueueEvent::HealthStatusChanged {
                status: status.clone(),
            });
        }

        // Configured actions run synchronously after the cycle
        self.apply_actions(&status).await;
        status
    }

    fn result(id: &str, value: f64, threshold: f64, now: i64) -> HealthCheckResult {
        HealthCheckResult {
            id: id.to_string(),
            status: CheckStatus::from_reading(value, threshold),
            value,
            threshold,
            timestamp: now,
        }
    }

    fn recommendations(results: &[HealthCheckResult]) -> Vec<String> {
        results
            .iter()
            .filter(|r| r.status == CheckStatus::Fail)
            .map(|r| match r.id.as_str() {
                "memory" => "increase memory limits or shorten queue retention".to_string(),
                "storage" => "prune persisted snapshots or free storage".to_string(),
                "network" => "check connectivity; dispatch pauses while offline".to_string(),
                "queue" => "scale workers or raise queue capacity".to_string(),
                "sync" => "inspect failing operations and the sync target".to_string(),
                other => format!("investigate failing check {}", other),
            })
            .collect()
    }

    async fn apply_actions(&self, status: &HealthStatus) {
        let checks = &self.settings.checks;
        for result in &status.checks {
            if result.status != CheckStatus::Fail {
                continue;
            }
            let action = match result.id.as_str() {
                "memory" => checks.memory.action,
                "storage" => checks.storage.action,
                "network" => checks.network.action,
                "queue" => checks.queue.action,
                "sync" => checks.sync.action,
                _ => None,
            };
            match action {
                Some(CheckAction::Scale) => {
                    self.scaler
                        .request_scale_up(&format!("health check {} failing", result.id));
                }
                Some(CheckAction::Pause) => {
                    warn!(check = %result.id, "Health check pausing dispatch");
                    self.gate.pause();
                }
                None => {}
            }
        }
    }

    /// Periodic health loop (spawned by the manager)
    pub async fn run(self: Arc<Self>, mut shutdown: ShutdownToken) {
        info!(interval_ms = self.settings.interval_ms, "Health runner started");
        let mut tick = interval(Duration::from_millis(self.settings.interval_ms));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.wait() => {
                    info!("Health runner stopped");
                    break;
                }
            }
        }
    }
}
