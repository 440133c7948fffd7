// Retry Policy Model

use crate::domain::operation::ErrorClass;
use serde::{Deserialize, Serialize};

/// Backoff delay growth strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
}

/// Per-error-class retry override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryCondition {
    pub error_class: ErrorClass,
    pub max_retries: u32,
}

/// Retry policy for failed operations.
///
/// The effective retry ceiling for an item is
/// `min(max_retries, condition override)` for the error class actually
/// observed; classes without an override use the global ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    pub initial_delay_ms: i64,
    pub max_delay_ms: i64,
    pub multiplier: f64,
    pub jitter: bool,
    #[serde(default)]
    pub conditions: Vec<RetryCondition>,
}

impl RetryPolicy {
    /// Effective ceiling for an observed error class
    pub fn effective_max_retries(&self, class: ErrorClass) -> u32 {
        self.conditions
            .iter()
            .find(|c| c.error_class == class)
            .map(|c| c.max_retries.min(self.max_retries))
            .unwrap_or(self.max_retries)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffStrategy::Exponential,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
            conditions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_ceiling_is_min_of_global_and_condition() {
        let policy = RetryPolicy {
            max_retries: 3,
            conditions: vec![
                RetryCondition {
                    error_class: ErrorClass::RateLimit,
                    max_retries: 5,
                },
                RetryCondition {
                    error_class: ErrorClass::Conflict,
                    max_retries: 1,
                },
            ],
            ..RetryPolicy::default()
        };

        // Condition above the global ceiling is clamped down
        assert_eq!(policy.effective_max_retries(ErrorClass::RateLimit), 3);
        // Condition below the global ceiling wins
        assert_eq!(policy.effective_max_retries(ErrorClass::Conflict), 1);
        // No override falls back to the global ceiling
        assert_eq!(policy.effective_max_retries(ErrorClass::NetworkError), 3);
    }
}
