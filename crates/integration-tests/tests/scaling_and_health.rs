//! Scaling, health, and alerting behavior through the full manager

use std::sync::Arc;
use std::time::Duration;

use opsync_core::application::queue::EnqueueOptions;
use opsync_core::application::QueueManager;
use opsync_core::config::{CheckAction, ManagerConfig};
use opsync_core::domain::alert::{AlertMetric, AlertRule, AlertSeverity};
use opsync_core::domain::condition::ConditionOp;
use opsync_core::domain::health::HealthState;
use opsync_core::domain::operation::{
    ErrorClass, Operation, OperationKind, OperationPayload,
};
use opsync_core::domain::retry::RetryPolicy;
use opsync_core::port::id_provider::UuidProvider;
use opsync_core::port::notifier::mocks::RecordingChannel;
use opsync_core::port::resource_probe::mocks::MockResourceProbe;
use opsync_core::port::sync_executor::mocks::MockSyncExecutor;
use opsync_core::port::time_provider::SystemTimeProvider;
use opsync_core::port::NotificationChannel;
use opsync_infra_sqlite::{create_pool, run_migrations, SqliteStateStore};

fn operation(kind: &str) -> Operation {
    Operation::new(
        OperationKind::new(kind),
        OperationPayload::new(serde_json::json!({})),
    )
}

fn fast_config() -> ManagerConfig {
    let mut config = ManagerConfig::default();
    config.metrics_interval_ms = 100;
    config.health.interval_ms = 100;
    config.resources.interval_ms = 100;
    config.scaling.interval_ms = 60_000;
    config
}

struct Harness {
    manager: QueueManager,
    probe: Arc<MockResourceProbe>,
    channel: Arc<RecordingChannel>,
}

async fn harness(db_path: &str, config: ManagerConfig, executor: Arc<MockSyncExecutor>) -> Harness {
    let _ = std::fs::remove_file(db_path);
    let pool = create_pool(db_path).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let time = Arc::new(SystemTimeProvider);
    let store = Arc::new(SqliteStateStore::new(pool, time.clone()));
    let probe = Arc::new(MockResourceProbe::new());
    let channel = Arc::new(RecordingChannel::new());
    let channels: Vec<Arc<dyn NotificationChannel>> = vec![channel.clone()];

    let manager = QueueManager::new(
        config,
        executor,
        store,
        probe.clone(),
        channels,
        time,
        Arc::new(UuidProvider),
    )
    .unwrap();
    Harness {
        manager,
        probe,
        channel,
    }
}

async fn wait_for<F: Fn() -> bool>(cond: F, timeout_ms: u64) -> bool {
    let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms);
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

#[tokio::test]
async fn test_memory_over_threshold_reports_unhealthy() {
    let h = harness(
        "/tmp/opsync_test_health_memory.db",
        fast_config(),
        Arc::new(MockSyncExecutor::new_success()),
    )
    .await;
    h.manager.initialize().await.unwrap();

    // Default memory threshold is 80; 85 must fail the check
    h.probe.set_memory_pct(85.0);

    let unhealthy = wait_for(
        || {
            h.manager
                .health()
                .map(|s| s.status == HealthState::Unhealthy)
                .unwrap_or(false)
        },
        3_000,
    )
    .await;
    assert!(unhealthy);

    let status = h.manager.health().unwrap();
    let memory = status.checks.iter().find(|c| c.id == "memory").unwrap();
    assert_eq!(memory.value, 85.0);
    assert!(status.score < 1.0);

    h.manager.destroy().await.unwrap();
}

#[tokio::test]
async fn test_health_scale_action_enables_a_worker() {
    let mut config = fast_config();
    config.health.checks.memory.action = Some(CheckAction::Scale);
    config.scaling.min_workers = 1;
    config.scaling.initial_workers = 1;
    config.scaling.max_workers = 3;
    // Large cooldown: repeated failing cycles only add one worker
    config.scaling.scale_up_cooldown_ms = 60_000;

    let h = harness(
        "/tmp/opsync_test_health_scale.db",
        config,
        Arc::new(MockSyncExecutor::new_success()),
    )
    .await;
    h.manager.initialize().await.unwrap();
    h.probe.set_memory_pct(95.0);

    let scaled = wait_for(
        || {
            h.manager
                .workers()
                .iter()
                .filter(|w| w.enabled)
                .count()
                == 2
        },
        3_000,
    )
    .await;
    assert!(scaled, "failing memory check with Scale action should enable one worker");

    // Cooldown holds the pool at two despite continued failures
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        h.manager.workers().iter().filter(|w| w.enabled).count(),
        2
    );

    h.manager.destroy().await.unwrap();
}

#[tokio::test]
async fn test_error_rate_alert_fires_and_resolves_explicitly() {
    let mut config = fast_config();
    // Terminal failures immediately: no retries
    config.retry = RetryPolicy {
        max_retries: 0,
        jitter: false,
        ..RetryPolicy::default()
    };
    config.alert_rules = vec![AlertRule {
        id: "sync-error-rate".into(),
        metric: AlertMetric::ErrorRate,
        op: ConditionOp::Gt,
        value: 0.5,
        duration_ms: 0,
        cooldown_ms: 60_000,
        severity: AlertSeverity::High,
    }];

    let h = harness(
        "/tmp/opsync_test_alert_error_rate.db",
        config,
        Arc::new(MockSyncExecutor::new_fail(ErrorClass::ServerError, "500")),
    )
    .await;
    h.manager.initialize().await.unwrap();

    h.manager
        .enqueue(operation("upload"), EnqueueOptions::default())
        .unwrap();

    let alerted = wait_for(|| !h.manager.alerts().is_empty(), 5_000).await;
    assert!(alerted, "error-rate rule should fire");

    let alerts = h.manager.alerts();
    let alert = alerts
        .iter()
        .find(|a| a.rule_id == "sync-error-rate")
        .expect("alert from the configured rule");
    assert_eq!(alert.severity, AlertSeverity::High);
    assert!(!alert.resolved);
    assert!(!h.channel.delivered().is_empty(), "channel was notified");

    // Resolution is explicit; the cleared condition does not resolve it
    assert!(h.manager.resolve_alert(&alert.id).unwrap());
    let resolved = h
        .manager
        .alerts()
        .into_iter()
        .find(|a| a.id == alert.id)
        .unwrap();
    assert!(resolved.resolved);
    assert!(resolved.resolved_at.is_some());

    h.manager.destroy().await.unwrap();
}

#[tokio::test]
async fn test_scaling_history_survives_restart() {
    let db_path = "/tmp/opsync_test_scaling_history.db";
    let h = harness(
        db_path,
        fast_config(),
        Arc::new(MockSyncExecutor::new_success()),
    )
    .await;
    h.manager.initialize().await.unwrap();

    let event = h.manager.scale_to(3).unwrap();
    assert_eq!(event.to_workers, 3);
    h.manager.destroy().await.unwrap();

    // Rebuild over the same database without deleting it
    let pool = create_pool(db_path).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let time = Arc::new(SystemTimeProvider);
    let store = Arc::new(SqliteStateStore::new(pool, time.clone()));
    let restored = QueueManager::new(
        fast_config(),
        Arc::new(MockSyncExecutor::new_success()),
        store,
        Arc::new(MockResourceProbe::new()),
        Vec::new(),
        time,
        Arc::new(UuidProvider),
    )
    .unwrap();
    restored.initialize().await.unwrap();

    assert!(
        !restored.scaling_history().is_empty(),
        "scaling history restored from the snapshot store"
    );

    restored.destroy().await.unwrap();
    let _ = std::fs::remove_file(db_path);
}
