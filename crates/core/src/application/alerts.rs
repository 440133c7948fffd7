// Alert Engine
//
// Declarative rules evaluated on every metrics tick. A rule fires after
// its condition holds continuously for the configured duration; the
// per-rule cooldown then gates re-firing. Resolution is explicit:
// clearing the condition never auto-resolves an alert.

use crate::application::queue::QueueMetrics;
use crate::domain::alert::{Alert, AlertMetric, AlertRule, AlertSeverity, Notification};
use crate::domain::events::QueueEvent;
use crate::port::{IdProvider, NotificationChannel, TimeProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info};

#[derive(Default)]
struct RuleState {
    held_since: Option<i64>,
    last_fired_at: Option<i64>,
}

struct AlertState {
    alerts: Vec<Alert>,
    rule_states: HashMap<String, RuleState>,
}

pub struct AlertEngine {
    rules: Vec<AlertRule>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    time: Arc<dyn TimeProvider>,
    ids: Arc<dyn IdProvider>,
    events: broadcast::Sender<QueueEvent>,
    state: Mutex<AlertState>,
}

impl AlertEngine {
    pub fn new(
        rules: Vec<AlertRule>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        time: Arc<dyn TimeProvider>,
        ids: Arc<dyn IdProvider>,
        events: broadcast::Sender<QueueEvent>,
    ) -> Self {
        Self {
            rules,
            channels,
            time,
            ids,
            events,
            state: Mutex::new(AlertState {
                alerts: Vec::new(),
                rule_states: HashMap::new(),
            }),
        }
    }

    fn metric_value(metrics: &QueueMetrics, metric: AlertMetric) -> f64 {
        match metric {
            AlertMetric::QueueUtilization => metrics.queue_utilization,
            AlertMetric::QueueSize => metrics.size as f64,
            AlertMetric::ErrorRate => metrics.error_rate,
            AlertMetric::Throughput => metrics.throughput,
            AlertMetric::AverageProcessingTime => metrics.average_processing_time_ms,
            AlertMetric::MemoryUsage => metrics.memory_usage_bytes as f64,
        }
    }

    /// Evaluate all rules against a metrics snapshot, firing any whose
    /// condition has held long enough. Returns the alerts created.
    pub async fn evaluate(&self, metrics: &QueueMetrics) -> Vec<Alert> {
        let now = self.time.now_millis();
        let mut fired: Vec<Alert> = Vec::new();

        {
            let mut state = self.state.lock().unwrap();
            for rule in &self.rules {
                let value = Self::metric_value(metrics, rule.metric);
                let holds = rule.op.compare_f64(value, rule.value);
                let rule_state = state.rule_states.entry(rule.id.clone()).or_default();

                if !holds {
                    rule_state.held_since = None;
                    continue;
                }

                let held_since = *rule_state.held_since.get_or_insert(now);
                if now - held_since < rule.duration_ms {
                    debug!(rule_id = %rule.id, "Condition holding, duration not reached");
                    continue;
                }
                let in_cooldown = rule_state
                    .last_fired_at
                    .map(|t| now - t < rule.cooldown_ms)
                    .unwrap_or(false);
                if in_cooldown {
                    continue;
                }

                rule_state.last_fired_at = Some(now);
                let alert = Alert {
                    id: self.ids.generate_id(),
                    rule_id: rule.id.clone(),
                    severity: rule.severity,
                    title: format!("Alert rule {} fired", rule.id),
                    message: format!(
                        "{:?} = {:.3} {:?} {:.3} held for {}ms",
                        rule.metric, value, rule.op, rule.value, now - held_since
                    ),
                    timestamp: now,
                    resolved: false,
                    resolved_at: None,
                };
                state.alerts.push(alert.clone());
                fired.push(alert);
            }
        }

        for alert in &fired {
            self.dispatch(alert).await;
        }
        fired
    }

    /// Create an alert from a direct event trigger (resource critical,
    /// terminal failure burst) rather than rule evaluation
    pub async fn trigger(
        &self,
        source: &str,
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Alert {
        let now = self.time.now_millis();
        let alert = Alert {
            id: self.ids.generate_id(),
            rule_id: source.to_string(),
            severity,
            title: title.into(),
            message: message.into(),
            timestamp: now,
            resolved: false,
            resolved_at: None,
        };
        self.state.lock().unwrap().alerts.push(alert.clone());
        self.dispatch(&alert).await;
        alert
    }

    async fn dispatch(&self, alert: &Alert) {
        info!(
            alert_id = %alert.id,
            rule_id = %alert.rule_id,
            severity = %alert.severity,
            "Alert created"
        );
        let notification = Notification::from(alert);
        for channel in self.channels.iter().filter(|c| c.enabled()) {
            channel.notify(&notification).await;
        }
        let _ = self.events.send(QueueEvent::AlertCreated {
            alert: alert.clone(),
        });
    }

    /// Explicitly resolve an alert; false when unknown or already resolved
    pub fn resolve(&self, alert_id: &str) -> bool {
        let now = self.time.now_millis();
        let mut state = self.state.lock().unwrap();
        match state
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id && !a.resolved)
        {
            Some(alert) => {
                alert.resolve(now);
                info!(alert_id = %alert_id, "Alert resolved");
                true
            }
            None => false,
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.state.lock().unwrap().alerts.clone()
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.state
            .lock()
            .unwrap()
            .alerts
            .iter()
            .filter(|a| !a.resolved)
            .cloned()
            .collect()
    }

    /// Restore persisted alerts on startup
    pub fn restore(&self, alerts: Vec<Alert>) {
        self.state.lock().unwrap().alerts = alerts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::ConditionOp;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::notifier::mocks::RecordingChannel;
    use crate::port::time_provider::mocks::MockTimeProvider;

    fn metrics(error_rate: f64) -> QueueMetrics {
        QueueMetrics {
            size: 5,
            queue_utilization: 0.5,
            throughput: 1.0,
            error_rate,
            average_processing_time_ms: 100.0,
            memory_usage_bytes: 2_048,
            completed_total: 10,
            failed_total: 2,
            in_flight: 1,
        }
    }

    struct Fixture {
        engine: AlertEngine,
        channel: Arc<RecordingChannel>,
        time: Arc<MockTimeProvider>,
    }

    fn fixture(rules: Vec<AlertRule>) -> Fixture {
        let time = Arc::new(MockTimeProvider::new(1_000_000));
        let channel = Arc::new(RecordingChannel::new());
        let (events, _) = broadcast::channel(64);
        let engine = AlertEngine::new(
            rules,
            vec![channel.clone()],
            time.clone(),
            Arc::new(SequentialIdProvider::new("alert")),
            events,
        );
        Fixture {
            engine,
            channel,
            time,
        }
    }

    fn error_rate_rule(duration_ms: i64, cooldown_ms: i64) -> AlertRule {
        AlertRule {
            id: "high-error-rate".into(),
            metric: AlertMetric::ErrorRate,
            op: ConditionOp::Gt,
            value: 0.5,
            duration_ms,
            cooldown_ms,
            severity: AlertSeverity::High,
        }
    }

    #[tokio::test]
    async fn test_rule_fires_only_after_duration() {
        let f = fixture(vec![error_rate_rule(5_000, 60_000)]);

        // First observation starts the held-since clock, nothing fires
        assert!(f.engine.evaluate(&metrics(0.8)).await.is_empty());

        f.time.advance(3_000);
        assert!(f.engine.evaluate(&metrics(0.8)).await.is_empty());

        f.time.advance(2_000);
        let fired = f.engine.evaluate(&metrics(0.8)).await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].rule_id, "high-error-rate");
        assert_eq!(f.channel.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_condition_clearing_resets_duration() {
        let f = fixture(vec![error_rate_rule(5_000, 0)]);

        f.engine.evaluate(&metrics(0.8)).await;
        f.time.advance(3_000);
        // Condition clears, held-since resets
        f.engine.evaluate(&metrics(0.1)).await;
        f.time.advance(3_000);
        assert!(f.engine.evaluate(&metrics(0.8)).await.is_empty());
    }

    #[tokio::test]
    async fn test_cooldown_prevents_refire() {
        let f = fixture(vec![error_rate_rule(0, 60_000)]);

        assert_eq!(f.engine.evaluate(&metrics(0.8)).await.len(), 1);
        f.time.advance(30_000);
        // Condition persists, cooldown suppresses
        assert!(f.engine.evaluate(&metrics(0.8)).await.is_empty());
        f.time.advance(30_000);
        assert_eq!(f.engine.evaluate(&metrics(0.8)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_is_explicit() {
        let f = fixture(vec![error_rate_rule(0, 0)]);
        let fired = f.engine.evaluate(&metrics(0.8)).await;
        let id = fired[0].id.clone();

        // Condition clearing does not resolve
        f.engine.evaluate(&metrics(0.0)).await;
        assert_eq!(f.engine.active_alerts().len(), 1);

        assert!(f.engine.resolve(&id));
        assert!(f.engine.active_alerts().is_empty());
        // Double-resolve is a no-op
        assert!(!f.engine.resolve(&id));
    }

    #[tokio::test]
    async fn test_direct_trigger_notifies_channels() {
        let f = fixture(vec![]);
        let alert = f
            .engine
            .trigger(
                "resource:memory",
                AlertSeverity::Critical,
                "Memory critical",
                "memory at 95%",
            )
            .await;
        assert!(!alert.resolved);
        assert_eq!(f.channel.delivered().len(), 1);
        assert_eq!(f.channel.delivered()[0].severity, AlertSeverity::Critical);
    }
}
