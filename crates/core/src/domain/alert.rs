// Alert Domain Models

use crate::domain::condition::ConditionOp;
use serde::{Deserialize, Serialize};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// Metric a rule observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    QueueUtilization,
    QueueSize,
    ErrorRate,
    Throughput,
    AverageProcessingTime,
    MemoryUsage,
}

/// Declarative alert rule.
///
/// Fires when the condition holds continuously for `duration_ms`; the
/// per-rule `cooldown_ms` prevents re-firing while it elapses even if the
/// condition persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub metric: AlertMetric,
    pub op: ConditionOp,
    pub value: f64,
    pub duration_ms: i64,
    pub cooldown_ms: i64,
    pub severity: AlertSeverity,
}

/// An alert created by rule evaluation or a direct event trigger.
///
/// Mutated only by explicit resolution; retained until externally pruned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub timestamp: i64,
    pub resolved: bool,
    pub resolved_at: Option<i64>,
}

impl Alert {
    pub fn resolve(&mut self, now_millis: i64) {
        self.resolved = true;
        self.resolved_at = Some(now_millis);
    }
}

/// Structured record pushed to every enabled notification channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub timestamp: i64,
}

impl From<&Alert> for Notification {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.id.clone(),
            title: alert.title.clone(),
            message: alert.message.clone(),
            severity: alert.severity,
            timestamp: alert.timestamp,
        }
    }
}
