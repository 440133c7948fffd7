// Manager Configuration
//
// Single structured configuration object covering queue limits, retry
// policy, throttling, scaling, health checks, resource limits, alert
// rules, and batch strategies. Validated at construction: the manager
// never starts with an invalid configuration.

use crate::domain::alert::AlertRule;
use crate::domain::condition::Condition;
use crate::domain::operation::Priority;
use crate::domain::retry::RetryPolicy;
use crate::error::{QueueError, Result};
use serde::{Deserialize, Serialize};

/// Queue admission and execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    pub max_queue_size: usize,
    pub max_concurrent_operations: usize,
    pub operation_timeout_ms: u64,
    /// Terminal items older than this are removed by the cleanup pass
    pub completed_retention_ms: i64,
    pub cleanup_interval_ms: u64,
    /// Sliding window for throughput / processing-time metrics
    pub metrics_window_ms: i64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 1_000,
            max_concurrent_operations: 10,
            operation_timeout_ms: 30_000,
            completed_retention_ms: 24 * 60 * 60 * 1_000,
            cleanup_interval_ms: 60_000,
            metrics_window_ms: 60_000,
        }
    }
}

/// Dispatch processing mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchMode {
    /// Dispatch as soon as a slot frees
    Immediate,
    /// Accumulate up to batch_size items or until the interval elapses
    Batch {
        batch_size: usize,
        processing_interval_ms: u64,
    },
    /// Dispatch only at fixed interval ticks
    Scheduled { interval_ms: u64 },
}

/// Token-bucket throttle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleSettings {
    pub max_operations_per_second: f64,
    pub burst_size: u32,
    pub window_ms: i64,
}

/// Dispatch behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    #[serde(flatten)]
    pub mode: DispatchMode,
    pub throttle: Option<ThrottleSettings>,
    /// Reduce dispatch rate further as the error rate climbs
    pub adaptive_throttling: bool,
    /// Pause dispatch entirely while the probe reports the network down
    pub network_aware: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Immediate,
            throttle: None,
            adaptive_throttling: false,
            network_aware: true,
        }
    }
}

/// Worker pool and auto-scaling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingSettings {
    pub min_workers: usize,
    pub max_workers: usize,
    pub initial_workers: usize,
    /// Utilization above this enables one more worker
    pub scale_up_threshold: f64,
    /// Utilization below this disables one worker
    pub scale_down_threshold: f64,
    pub scale_up_cooldown_ms: i64,
    pub scale_down_cooldown_ms: i64,
    pub interval_ms: u64,
}

impl Default for ScalingSettings {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 4,
            initial_workers: 2,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.2,
            scale_up_cooldown_ms: 60_000,
            scale_down_cooldown_ms: 120_000,
            interval_ms: 15_000,
        }
    }
}

/// Action a failing health check may trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckAction {
    Scale,
    Pause,
}

/// One health check: threshold plus optional automatic action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSettings {
    pub threshold: f64,
    pub action: Option<CheckAction>,
}

/// The fixed set of health checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthChecks {
    pub memory: CheckSettings,
    pub storage: CheckSettings,
    pub network: CheckSettings,
    pub queue: CheckSettings,
    pub sync: CheckSettings,
}

impl Default for HealthChecks {
    fn default() -> Self {
        Self {
            memory: CheckSettings {
                threshold: 80.0,
                action: None,
            },
            storage: CheckSettings {
                threshold: 90.0,
                action: None,
            },
            network: CheckSettings {
                threshold: 500.0,
                action: None,
            },
            queue: CheckSettings {
                threshold: 90.0,
                action: Some(CheckAction::Scale),
            },
            sync: CheckSettings {
                threshold: 50.0,
                action: None,
            },
        }
    }
}

/// Health runner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    pub interval_ms: u64,
    pub check_timeout_ms: u64,
    pub checks: HealthChecks,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            check_timeout_ms: 5_000,
            checks: HealthChecks::default(),
        }
    }
}

/// Mitigation applied when a resource crosses critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitAction {
    Alert,
    Throttle,
    Pause,
    Clear,
}

/// Warning/critical thresholds for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    pub warning: f64,
    pub critical: f64,
    pub action: LimitAction,
}

/// Resource monitor settings.
///
/// Memory, storage and cpu limits are percentages; the network limit is
/// judged on observed latency in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSettings {
    pub interval_ms: u64,
    pub memory: LimitSettings,
    pub storage: LimitSettings,
    pub network: LimitSettings,
    pub cpu: LimitSettings,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            memory: LimitSettings {
                warning: 75.0,
                critical: 90.0,
                action: LimitAction::Pause,
            },
            storage: LimitSettings {
                warning: 80.0,
                critical: 95.0,
                action: LimitAction::Clear,
            },
            network: LimitSettings {
                warning: 300.0,
                critical: 1_000.0,
                action: LimitAction::Alert,
            },
            cpu: LimitSettings {
                warning: 80.0,
                critical: 95.0,
                action: LimitAction::Throttle,
            },
        }
    }
}

/// Batch coalescing strategy: merge matching pending items of one kind
/// once at least `min_count` of them accumulate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStrategy {
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub min_count: usize,
}

/// Admission-time priority boost for matching items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityRule {
    pub conditions: Vec<Condition>,
    pub boost_to: Priority,
}

/// Top-level manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub queue: QueueSettings,
    pub dispatch: DispatchSettings,
    pub retry: RetryPolicy,
    pub scaling: ScalingSettings,
    pub health: HealthSettings,
    pub resources: ResourceSettings,
    pub alert_rules: Vec<AlertRule>,
    pub batch_strategies: Vec<BatchStrategy>,
    pub priority_rules: Vec<PriorityRule>,
    pub metrics_interval_ms: u64,
}

impl ManagerConfig {
    /// Validate every section; any violation is fatal at construction
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(QueueError::InvalidConfiguration(msg));

        if self.queue.max_queue_size == 0 {
            return fail("queue.max_queue_size must be positive".into());
        }
        if self.queue.max_concurrent_operations == 0 {
            return fail("queue.max_concurrent_operations must be positive".into());
        }
        if self.queue.operation_timeout_ms == 0 {
            return fail("queue.operation_timeout_ms must be positive".into());
        }
        if self.queue.metrics_window_ms <= 0 {
            return fail("queue.metrics_window_ms must be positive".into());
        }

        if let DispatchMode::Batch { batch_size, .. } = self.dispatch.mode {
            if batch_size == 0 {
                return fail("dispatch.batch_size must be positive".into());
            }
            if batch_size > self.queue.max_queue_size {
                return fail(format!(
                    "dispatch.batch_size {} exceeds queue.max_queue_size {}",
                    batch_size, self.queue.max_queue_size
                ));
            }
        }
        if let Some(throttle) = &self.dispatch.throttle {
            if throttle.max_operations_per_second <= 0.0 {
                return fail("throttle.max_operations_per_second must be positive".into());
            }
            if throttle.burst_size == 0 {
                return fail("throttle.burst_size must be positive".into());
            }
            if throttle.window_ms <= 0 {
                return fail("throttle.window_ms must be positive".into());
            }
        }

        if self.retry.initial_delay_ms <= 0 {
            return fail("retry.initial_delay_ms must be positive".into());
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return fail("retry.max_delay_ms must be >= retry.initial_delay_ms".into());
        }
        if self.retry.multiplier < 1.0 {
            return fail("retry.multiplier must be >= 1.0".into());
        }

        let s = &self.scaling;
        if s.min_workers == 0 {
            return fail("scaling.min_workers must be positive".into());
        }
        if s.min_workers > s.max_workers {
            return fail("scaling.min_workers must be <= scaling.max_workers".into());
        }
        if s.initial_workers < s.min_workers || s.initial_workers > s.max_workers {
            return fail(format!(
                "scaling.initial_workers {} outside [{}, {}]",
                s.initial_workers, s.min_workers, s.max_workers
            ));
        }
        if !(0.0 < s.scale_up_threshold && s.scale_up_threshold <= 1.0) {
            return fail("scaling.scale_up_threshold must be in (0, 1]".into());
        }
        if !(0.0 <= s.scale_down_threshold && s.scale_down_threshold < s.scale_up_threshold) {
            return fail("scaling.scale_down_threshold must be below scale_up_threshold".into());
        }
        if s.interval_ms == 0 {
            return fail("scaling.interval_ms must be positive".into());
        }

        if self.health.interval_ms == 0 || self.health.check_timeout_ms == 0 {
            return fail("health.interval_ms and health.check_timeout_ms must be positive".into());
        }
        for (name, check) in [
            ("memory", &self.health.checks.memory),
            ("storage", &self.health.checks.storage),
            ("network", &self.health.checks.network),
            ("queue", &self.health.checks.queue),
            ("sync", &self.health.checks.sync),
        ] {
            if check.threshold <= 0.0 {
                return fail(format!("health.checks.{}.threshold must be positive", name));
            }
        }

        for (name, limit) in [
            ("memory", &self.resources.memory),
            ("storage", &self.resources.storage),
            ("network", &self.resources.network),
            ("cpu", &self.resources.cpu),
        ] {
            if limit.warning >= limit.critical {
                return fail(format!(
                    "resources.{}.warning must be below its critical threshold",
                    name
                ));
            }
        }

        for rule in &self.alert_rules {
            if rule.duration_ms < 0 || rule.cooldown_ms < 0 {
                return fail(format!(
                    "alert rule {}: duration and cooldown must be non-negative",
                    rule.id
                ));
            }
        }

        for strategy in &self.batch_strategies {
            if strategy.min_count < 2 {
                return fail(format!(
                    "batch strategy {}: min_count must be at least 2",
                    strategy.name
                ));
            }
        }

        if self.metrics_interval_ms == 0 {
            return fail("metrics_interval_ms must be positive".into());
        }

        Ok(())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            queue: QueueSettings::default(),
            dispatch: DispatchSettings::default(),
            retry: RetryPolicy::default(),
            scaling: ScalingSettings::default(),
            health: HealthSettings::default(),
            resources: ResourceSettings::default(),
            alert_rules: Vec::new(),
            batch_strategies: Vec::new(),
            priority_rules: Vec::new(),
            metrics_interval_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ManagerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_queue_size() {
        let mut config = ManagerConfig::default();
        config.queue.max_queue_size = 0;
        assert!(matches!(
            config.validate(),
            Err(QueueError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_rejects_batch_size_over_queue_size() {
        let mut config = ManagerConfig::default();
        config.queue.max_queue_size = 10;
        config.dispatch.mode = DispatchMode::Batch {
            batch_size: 11,
            processing_interval_ms: 1000,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_worker_bounds() {
        let mut config = ManagerConfig::default();
        config.scaling.min_workers = 5;
        config.scaling.max_workers = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_scale_thresholds_out_of_order() {
        let mut config = ManagerConfig::default();
        config.scaling.scale_down_threshold = 0.9;
        config.scaling.scale_up_threshold = 0.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_warning_above_critical() {
        let mut config = ManagerConfig::default();
        config.resources.memory.warning = 95.0;
        config.resources.memory.critical = 90.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_max_delay_below_initial() {
        let mut config = ManagerConfig::default();
        config.retry.initial_delay_ms = 5_000;
        config.retry.max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }
}
