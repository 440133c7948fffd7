// Resource Monitor
//
// Polls the injected resource probe on its own timer and applies the
// configured mitigation when a resource crosses critical. Level changes
// are edge-triggered: an alert is raised when a resource enters warning
// or critical, not on every tick it stays there.

use crate::application::alerts::AlertEngine;
use crate::application::queue::{ClearOptions, DispatchGate, OperationQueue};
use crate::application::worker::ShutdownToken;
use crate::config::{LimitAction, LimitSettings, ResourceSettings};
use crate::domain::alert::AlertSeverity;
use crate::domain::operation::ItemStatus;
use crate::port::ResourceProbe;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceLevel {
    Normal,
    Warning,
    Critical,
}

impl ResourceLevel {
    fn classify(value: f64, limits: &LimitSettings) -> Self {
        if value > limits.critical {
            ResourceLevel::Critical
        } else if value > limits.warning {
            ResourceLevel::Warning
        } else {
            ResourceLevel::Normal
        }
    }
}

struct MonitorState {
    levels: HashMap<&'static str, ResourceLevel>,
    paused_by_monitor: bool,
    throttled_by_monitor: bool,
}

pub struct ResourceMonitor {
    probe: Arc<dyn ResourceProbe>,
    gate: Arc<DispatchGate>,
    queue: Arc<OperationQueue>,
    alerts: Arc<AlertEngine>,
    settings: ResourceSettings,
    interval_ms: u64,
    state: Mutex<MonitorState>,
}

impl ResourceMonitor {
    pub fn new(
        probe: Arc<dyn ResourceProbe>,
        gate: Arc<DispatchGate>,
        queue: Arc<OperationQueue>,
        alerts: Arc<AlertEngine>,
        settings: ResourceSettings,
    ) -> Self {
        let interval_ms = settings.interval_ms;
        Self {
            probe,
            gate,
            queue,
            alerts,
            settings,
            interval_ms,
            state: Mutex::new(MonitorState {
                levels: HashMap::new(),
                paused_by_monitor: false,
                throttled_by_monitor: false,
            }),
        }
    }

    /// One monitoring pass. Mitigations run synchronously here, before
    /// the next dispatch cycle can pull more work.
    pub async fn tick(&self) {
        let readings = self.probe.read().await;
        // The network reading is latency-based; an offline network counts
        // as past-critical
        let network_value = if readings.network_online {
            readings.network_latency_ms.unwrap_or(0.0)
        } else {
            self.settings.network.critical + 1.0
        };
        let observations = [
            ("memory", readings.memory_pct, self.settings.memory.clone()),
            (
                "storage",
                readings.storage_pct,
                self.settings.storage.clone(),
            ),
            (
                "network",
                network_value,
                self.settings.network.clone(),
            ),
            ("cpu", readings.cpu_pct, self.settings.cpu.clone()),
        ];

        let mut any_above_warning = false;
        for (name, value, limits) in observations {
            let level = ResourceLevel::classify(value, &limits);
            if level != ResourceLevel::Normal {
                any_above_warning = true;
            }

            let previous = {
                let mut state = self.state.lock().unwrap();
                state.levels.insert(name, level)
            }
            .unwrap_or(ResourceLevel::Normal);

            if level == previous {
                continue;
            }

            match level {
                ResourceLevel::Critical => {
                    warn!(
                        resource = name,
                        value = %value,
                        critical = %limits.critical,
                        action = ?limits.action,
                        "Resource crossed critical threshold"
                    );
                    self.apply_critical_action(name, value, &limits).await;
                }
                ResourceLevel::Warning if previous == ResourceLevel::Normal => {
                    self.alerts
                        .trigger(
                            &format!("resource:{}", name),
                            AlertSeverity::Medium,
                            format!("{} usage warning", name),
                            format!(
                                "{} at {:.1}% (warning threshold {:.1}%)",
                                name, value, limits.warning
                            ),
                        )
                        .await;
                }
                _ => {
                    info!(resource = name, value = %value, "Resource recovered");
                }
            }
        }

        // Lift monitor-owned mitigations once every resource is back
        // below warning
        if !any_above_warning {
            let (was_paused, was_throttled) = {
                let mut state = self.state.lock().unwrap();
                let flags = (state.paused_by_monitor, state.throttled_by_monitor);
                state.paused_by_monitor = false;
                state.throttled_by_monitor = false;
                flags
            };
            if was_paused {
                self.gate.resume();
            }
            if was_throttled {
                self.gate.set_emergency_throttle(false);
            }
        }
    }

    async fn apply_critical_action(&self, name: &str, value: f64, limits: &LimitSettings) {
        self.alerts
            .trigger(
                &format!("resource:{}", name),
                AlertSeverity::Critical,
                format!("{} usage critical", name),
                format!(
                    "{} at {:.1}% (critical threshold {:.1}%), action {:?}",
                    name, value, limits.critical, limits.action
                ),
            )
            .await;

        match limits.action {
            LimitAction::Alert => {}
            LimitAction::Throttle => {
                self.state.lock().unwrap().throttled_by_monitor = true;
                self.gate.set_emergency_throttle(true);
            }
            LimitAction::Pause => {
                self.state.lock().unwrap().paused_by_monitor = true;
                self.gate.pause();
            }
            LimitAction::Clear => {
                let removed = self.queue.clear(&ClearOptions {
                    statuses: vec![
                        ItemStatus::Completed,
                        ItemStatus::Cancelled,
                        ItemStatus::Failed,
                    ],
                    older_than_ms: None,
                });
                info!(
                    resource = name,
                    removed = removed,
                    "Cleared terminal items to relieve resource pressure"
                );
            }
        }
    }

    /// Periodic monitoring loop (spawned by the manager)
    pub async fn run(self: Arc<Self>, mut shutdown: ShutdownToken) {
        info!(interval_ms = self.interval_ms, "Resource monitor started");
        let mut tick = interval(Duration::from_millis(self.interval_ms));
        loop {
            tokio::select! {
                _ = tick.tick() => self.tick().await,
                _ = shutdown.wait() => {
                    info!("Resource monitor stopped");
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
    use crate::port::resource_probe::mocks::MockResourceProbe;
    use crate::port::time_provider::mocks::MockTimeProvider;
    use tokio::sync::broadcast;

    struct Fixture {
        monitor: ResourceMonitor,
        probe: Arc<MockResourceProbe>,
        gate: Arc<DispatchGate>,
        alerts: Arc<AlertEngine>,
    }

    fn fixture(settings: ResourceSettings) -> Fixture {
        let time = Arc::new(MockTimeProvider::new(1_000_000));
        let ids = Arc::new(SequentialIdProvider::new("alert"));
        let probe = Arc::new(MockResourceProbe::new());
        let gate = Arc::new(DispatchGate::new(None, false, 1_000_000));
        let (events, _) = broadcast::channel(64);
        let queue = Arc::new(OperationQueue::new(
            QueueSettings::default(),
            PriorityScheduler::new(Vec::new()),
            RetryEvaluator::new(RetryPolicy::default()),
            time.clone(),
            ids.clone(),
            events.clone(),
        ));
        let alerts = Arc::new(AlertEngine::new(
            Vec::new(),
            Vec::new(),
            time.clone(),
            ids,
            events,
        ));
        let monitor = ResourceMonitor::new(probe.clone(), gate.clone(), queue, alerts.clone(), settings);
        Fixture {
            monitor,
            probe,
            gate,
            alerts,
        }
    }

    #[tokio::test]
    async fn test_critical_memory_pauses_dispatch() {
        let mut settings = ResourceSettings::default();
        settings.memory.action = LimitAction::Pause;
        let f = fixture(settings);

        f.probe.set_memory_pct(95.0);
        f.monitor.tick().await;
        assert!(f.gate.is_paused());
        assert_eq!(f.alerts.active_alerts().len(), 1);

        // Recovery below warning lifts the pause
        f.probe.set_memory_pct(10.0);
        f.monitor.tick().await;
        assert!(!f.gate.is_paused());
    }

    #[tokio::test]
    async fn test_warning_is_edge_triggered() {
        let f = fixture(ResourceSettings::default());
        f.probe.set_memory_pct(80.0); // warning is 75.0
        f.monitor.tick().await;
        f.monitor.tick().await;
        f.monitor.tick().await;

        // One alert for entering warning, not one per tick
        assert_eq!(f.alerts.alerts().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_network_raises_alert_without_pausing() {
        let f = fixture(ResourceSettings::default());
        f.probe.set_network_online(false);
        f.monitor.tick().await;

        // Default network action is Alert: visibility only, workers
        // already pause dispatch themselves while offline
        assert_eq!(f.alerts.active_alerts().len(), 1);
        assert!(!f.gate.is_paused());
    }

    #[tokio::test]
    async fn test_critical_cpu_throttles() {
        let f = fixture(ResourceSettings::default());
        f.probe.set_cpu_pct(99.0); // cpu action defaults to Throttle
        f.monitor.tick().await;

        // Emergency throttle skips alternate acquisitions
        let mut granted = 0;
        for now in 0..10 {
            if f.gate.try_acquire(now, 0.0) {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
    }
}
