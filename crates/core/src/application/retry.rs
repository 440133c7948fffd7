// Retry Policy Evaluator

use crate::domain::operation::ErrorClass;
use crate::domain::retry::{BackoffStrategy, RetryPolicy};
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation (with backoff delay in ms)
    Retry(i64),
    /// No more attempts permitted, the item fails terminally
    Exhausted,
}

/// Pure retry evaluator over a policy.
///
/// `attempts` counts failures already recorded for the item, so a retry
/// is permitted while `attempts < effective_max_retries(class)` and the
/// attempt counter can never exceed the ceiling.
pub struct RetryEvaluator {
    policy: RetryPolicy,
}

impl RetryEvaluator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Decide whether the item retries and with what delay.
    ///
    /// Delay for the n-th failure (n = attempts + 1):
    /// - fixed:       initial_delay
    /// - linear:      initial_delay * n
    /// - exponential: min(max_delay, initial_delay * multiplier^(n-1))
    ///
    /// `jitter_seed` derives the bounded ±20% perturbation; callers pass
    /// the item id so each item jitters consistently across retries and
    /// items spread apart from each other.
    pub fn evaluate(&self, class: ErrorClass, attempts: u32, jitter_seed: &str) -> RetryDecision {
        let ceiling = self.policy.effective_max_retries(class);
        if attempts >= ceiling {
            warn!(
                error_class = %class,
                attempts = %attempts,
                max_retries = %ceiling,
                "Max retry attempts reached"
            );
            return RetryDecision::Exhausted;
        }

        let failure_number = (attempts + 1) as i64;
        let base_delay = match self.policy.backoff {
            BackoffStrategy::Fixed => self.policy.initial_delay_ms as f64,
            BackoffStrategy::Linear => (self.policy.initial_delay_ms * failure_number) as f64,
            BackoffStrategy::Exponential => {
                let raw = self.policy.initial_delay_ms as f64
                    * self.policy.multiplier.powi(failure_number as i32 - 1);
                raw.min(self.policy.max_delay_ms as f64)
            }
        };

        let delay_ms = if self.policy.jitter {
            (base_delay * jitter_factor(jitter_seed)) as i64
        } else {
            base_delay as i64
        };

        info!(
            error_class = %class,
            attempt = %failure_number,
            max_retries = %ceiling,
            delay_ms = %delay_ms,
            "Scheduling retry"
        );

        RetryDecision::Retry(delay_ms)
    }
}

/// Deterministic jitter in 0.8..=1.2 derived from the seed string.
///
/// Item-id-derived jitter spreads retries across many items without
/// sacrificing reproducibility in tests.
fn jitter_factor(seed: &str) -> f64 {
    let sum = seed.chars().map(|c| c as u32).sum::<u32>();
    0.8 + ((sum % 41) as f64 / 100.0) // 0.8 to 1.2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::retry::RetryCondition;

    fn exponential_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            backoff: BackoffStrategy::Exponential,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: false,
            conditions: Vec::new(),
        }
    }

    #[test]
    fn test_exponential_sequence_then_exhausted() {
        let evaluator = RetryEvaluator::new(exponential_policy());

        // Three consecutive network failures: 1000, 2000, 4000
        assert_eq!(
            evaluator.evaluate(ErrorClass::NetworkError, 0, "op"),
            RetryDecision::Retry(1_000)
        );
        assert_eq!(
            evaluator.evaluate(ErrorClass::NetworkError, 1, "op"),
            RetryDecision::Retry(2_000)
        );
        assert_eq!(
            evaluator.evaluate(ErrorClass::NetworkError, 2, "op"),
            RetryDecision::Retry(4_000)
        );
        // Fourth failure terminalizes
        assert_eq!(
            evaluator.evaluate(ErrorClass::NetworkError, 3, "op"),
            RetryDecision::Exhausted
        );
    }

    #[test]
    fn test_exponential_caps_at_max_delay() {
        let mut policy = exponential_policy();
        policy.max_retries = 10;
        policy.max_delay_ms = 5_000;
        let evaluator = RetryEvaluator::new(policy);

        assert_eq!(
            evaluator.evaluate(ErrorClass::NetworkError, 6, "op"),
            RetryDecision::Retry(5_000)
        );
    }

    #[test]
    fn test_fixed_and_linear_delays() {
        let mut policy = exponential_policy();
        policy.backoff = BackoffStrategy::Fixed;
        let fixed = RetryEvaluator::new(policy.clone());
        assert_eq!(
            fixed.evaluate(ErrorClass::Timeout, 2, "op"),
            RetryDecision::Retry(1_000)
        );

        policy.backoff = BackoffStrategy::Linear;
        let linear = RetryEvaluator::new(policy);
        assert_eq!(
            linear.evaluate(ErrorClass::Timeout, 0, "op"),
            RetryDecision::Retry(1_000)
        );
        assert_eq!(
            linear.evaluate(ErrorClass::Timeout, 2, "op"),
            RetryDecision::Retry(3_000)
        );
    }

    #[test]
    fn test_condition_override_lowers_ceiling() {
        let mut policy = exponential_policy();
        policy.conditions = vec![RetryCondition {
            error_class: ErrorClass::Conflict,
            max_retries: 1,
        }];
        let evaluator = RetryEvaluator::new(policy);

        assert!(matches!(
            evaluator.evaluate(ErrorClass::Conflict, 0, "op"),
            RetryDecision::Retry(_)
        ));
        assert_eq!(
            evaluator.evaluate(ErrorClass::Conflict, 1, "op"),
            RetryDecision::Exhausted
        );
        // Other classes keep the global ceiling
        assert!(matches!(
            evaluator.evaluate(ErrorClass::ServerError, 2, "op"),
            RetryDecision::Retry(_)
        ));
    }

    #[test]
    fn test_jitter_is_bounded_and_monotone_for_fixed_seed() {
        let mut policy = exponential_policy();
        policy.jitter = true;
        policy.max_retries = 5;
        let evaluator = RetryEvaluator::new(policy);

        let mut last = 0i64;
        for attempts in 0..5 {
            match evaluator.evaluate(ErrorClass::NetworkError, attempts, "item-7") {
                RetryDecision::Retry(delay) => {
                    let base = 1_000.0 * 2f64.powi(attempts as i32);
                    assert!((delay as f64) >= base * 0.8 - 1.0);
                    assert!((delay as f64) <= base * 1.2 + 1.0);
                    // Same seed -> same factor -> monotone growth
                    assert!(delay >= last, "delay {} regressed below {}", delay, last);
                    last = delay;
                }
                RetryDecision::Exhausted => panic!("unexpected exhaustion"),
            }
        }
    }
}
