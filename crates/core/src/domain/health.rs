// Health Check Domain Models

use serde::{Deserialize, Serialize};

/// Result of a single check cycle; superseded every cycle, never merged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub id: String,
    pub status: CheckStatus,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: i64,
}

/// Per-check outcome against its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl CheckStatus {
    /// value > threshold -> Fail; value > 0.8 * threshold -> Warn; else Pass
    pub fn from_reading(value: f64, threshold: f64) -> Self {
        if value > threshold {
            CheckStatus::Fail
        } else if value > 0.8 * threshold {
            CheckStatus::Warn
        } else {
            CheckStatus::Pass
        }
    }
}

/// Aggregate health state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
        };
        write!(f, "{}", name)
    }
}

/// Composite assessment produced by one health-check cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    /// Fraction of passing checks, 0.0..=1.0
    pub score: f64,
    pub checks: Vec<HealthCheckResult>,
    pub recommendations: Vec<String>,
    pub timestamp: i64,
}

impl HealthStatus {
    /// Aggregate: unhealthy if any check fails, degraded if any warns
    pub fn aggregate(checks: Vec<HealthCheckResult>, recommendations: Vec<String>, now: i64) -> Self {
        let total = checks.len().max(1);
        let passing = checks
            .iter()
            .filter(|c| c.status == CheckStatus::Pass)
            .count();
        let status = if checks.iter().any(|c| c.status == CheckStatus::Fail) {
            HealthState::Unhealthy
        } else if checks.iter().any(|c| c.status == CheckStatus::Warn) {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };
        Self {
            status,
            score: passing as f64 / total as f64,
            checks,
            recommendations,
            timestamp: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status_thresholds() {
        assert_eq!(CheckStatus::from_reading(85.0, 80.0), CheckStatus::Fail);
        assert_eq!(CheckStatus::from_reading(70.0, 80.0), CheckStatus::Warn);
        assert_eq!(CheckStatus::from_reading(50.0, 80.0), CheckStatus::Pass);
        // Boundary: exactly at threshold is not a failure
        assert_eq!(CheckStatus::from_reading(80.0, 80.0), CheckStatus::Warn);
    }

    #[test]
    fn test_aggregate_unhealthy_on_any_fail() {
        let checks = vec![
            HealthCheckResult {
                id: "memory".into(),
                status: CheckStatus::Fail,
                value: 85.0,
                threshold: 80.0,
                timestamp: 1000,
            },
            HealthCheckResult {
                id: "storage".into(),
                status: CheckStatus::Pass,
                value: 10.0,
                threshold: 90.0,
                timestamp: 1000,
            },
        ];
        let status = HealthStatus::aggregate(checks, vec![], 1000);
        assert_eq!(status.status, HealthState::Unhealthy);
        assert_eq!(status.score, 0.5);
    }
}
