//! End-to-end queue lifecycle tests
//!
//! Wires the real manager against the SQLite snapshot store and mock
//! transport/probe ports.

use std::sync::Arc;
use std::time::Duration;

use opsync_core::application::queue::EnqueueOptions;
use opsync_core::application::QueueManager;
use opsync_core::config::ManagerConfig;
use opsync_core::domain::events::QueueEvent;
use opsync_core::domain::operation::{
    ErrorClass, ItemStatus, Operation, OperationKind, OperationPayload, Priority,
};
use opsync_core::domain::retry::{BackoffStrategy, RetryPolicy};
use opsync_core::port::id_provider::UuidProvider;
use opsync_core::port::resource_probe::mocks::MockResourceProbe;
use opsync_core::port::sync_executor::mocks::{MockBehavior, MockSyncExecutor};
use opsync_core::port::time_provider::SystemTimeProvider;
use opsync_infra_sqlite::{create_pool, run_migrations, SqliteStateStore};

fn operation(kind: &str) -> Operation {
    Operation::new(
        OperationKind::new(kind),
        OperationPayload::new(serde_json::json!({"kind": kind})),
    )
}

fn fast_config() -> ManagerConfig {
    let mut config = ManagerConfig::default();
    config.metrics_interval_ms = 100;
    config.health.interval_ms = 100;
    config.resources.interval_ms = 100;
    config.scaling.interval_ms = 60_000;
    config.retry = RetryPolicy {
        max_retries: 2,
        backoff: BackoffStrategy::Fixed,
        initial_delay_ms: 50,
        max_delay_ms: 1_000,
        multiplier: 2.0,
        jitter: false,
        conditions: Vec::new(),
    };
    config
}

async fn manager_on_db(
    db_path: &str,
    config: ManagerConfig,
    executor: Arc<MockSyncExecutor>,
) -> QueueManager {
    let pool = create_pool(db_path).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let time = Arc::new(SystemTimeProvider);
    let store = Arc::new(SqliteStateStore::new(pool, time.clone()));

    QueueManager::new(
        config,
        executor,
        store,
        Arc::new(MockResourceProbe::new()),
        Vec::new(),
        time,
        Arc::new(UuidProvider),
    )
    .unwrap()
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
async fn test_end_to_end_completion_with_sqlite_store() {
    let db_path = "/tmp/opsync_test_e2e_completion.db";
    let _ = std::fs::remove_file(db_path);

    let executor = Arc::new(MockSyncExecutor::new_success());
    let manager = manager_on_db(db_path, fast_config(), executor.clone()).await;
    manager.initialize().await.unwrap();

    let id = manager
        .enqueue(operation("upload_record"), EnqueueOptions::default())
        .unwrap();

    let completed = wait_for(
        || {
            manager
                .get(&id)
                .map(|item| item.status == ItemStatus::Completed)
                .unwrap_or(false)
        },
        3_000,
    )
    .await;
    assert!(completed, "operation should reach Completed");
    assert!(executor.call_count() >= 1);

    let status = manager.status().unwrap();
    assert_eq!(status.metrics.completed_total, 1);
    assert_eq!(status.metrics.failed_total, 0);

    manager.destroy().await.unwrap();
    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn test_restart_restores_pending_items() {
    let db_path = "/tmp/opsync_test_restart_restore.db";
    let _ = std::fs::remove_file(db_path);

    // Every execution fails with a network error, so the item stays active
    let failing = Arc::new(MockSyncExecutor::new_fail(
        ErrorClass::NetworkError,
        "offline",
    ));
    let manager = manager_on_db(db_path, fast_config(), failing).await;
    manager.initialize().await.unwrap();

    let id = manager
        .enqueue(operation("upload_record"), EnqueueOptions::default())
        .unwrap();
    manager.destroy().await.unwrap();

    // A fresh manager over the same database sees the item again
    let restored = manager_on_db(
        db_path,
        fast_config(),
        Arc::new(MockSyncExecutor::new_success()),
    )
    .await;
    restored.initialize().await.unwrap();

    let item = restored.get(&id).expect("item restored from snapshot");
    assert!(
        item.status.is_active(),
        "restored item should be pending or processing, was {:?}",
        item.status
    );

    // And with a healthy transport it eventually completes
    let completed = wait_for(
        || {
            restored
                .get(&id)
                .map(|item| item.status == ItemStatus::Completed)
                .unwrap_or(false)
        },
        3_000,
    )
    .await;
    assert!(completed);

    restored.destroy().await.unwrap();
    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn test_critical_dispatches_before_low_with_one_worker() {
    let db_path = "/tmp/opsync_test_priority_order.db";
    let _ = std::fs::remove_file(db_path);

    let mut config = fast_config();
    config.queue.max_concurrent_operations = 1;
    config.scaling.min_workers = 1;
    config.scaling.max_workers = 1;
    config.scaling.initial_workers = 1;

    let executor = Arc::new(MockSyncExecutor::new_success());
    // The plug occupies the single worker while the contenders line up
    executor.push_script(MockBehavior::Hang(300));

    let manager = manager_on_db(db_path, config, executor).await;
    manager.initialize().await.unwrap();
    let mut events = manager.subscribe();

    let plug_id = manager
        .enqueue(operation("plug"), EnqueueOptions::default())
        .unwrap();
    // The contenders line up only once the plug occupies the worker
    let plug_running = wait_for(
        || {
            manager
                .get(&plug_id)
                .map(|item| item.status == ItemStatus::Processing)
                .unwrap_or(false)
        },
        2_000,
    )
    .await;
    assert!(plug_running, "plug operation should be in flight");

    manager
        .enqueue(
            operation("low"),
            EnqueueOptions {
                priority: Priority::Low,
                ..EnqueueOptions::default()
            },
        )
        .unwrap();
    manager
        .enqueue(
            operation("critical"),
            EnqueueOptions {
                priority: Priority::Critical,
                ..EnqueueOptions::default()
            },
        )
        .unwrap();

    // Collect completion order from the event stream
    let mut completion_order = Vec::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while completion_order.len() < 3 && std::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(500), events.recv()).await {
            Ok(Ok(QueueEvent::Completed { item })) => {
                completion_order.push(item.operation.kind.as_str().to_string());
            }
            Ok(Ok(_)) => {}
            Ok(Err(_)) | Err(_) => break,
        }
    }

    assert_eq!(
        completion_order,
        vec!["plug", "critical", "low"],
        "critical must win the free slot over low"
    );

    manager.destroy().await.unwrap();
    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn test_retry_exhaustion_terminalizes() {
    let db_path = "/tmp/opsync_test_retry_exhaustion.db";
    let _ = std::fs::remove_file(db_path);

    let failing = Arc::new(MockSyncExecutor::new_fail(
        ErrorClass::ServerError,
        "500 internal",
    ));
    // max_retries = 2 in fast_config: 1 initial + 2 retries = 3 calls
    let manager = manager_on_db(db_path, fast_config(), failing.clone()).await;
    manager.initialize().await.unwrap();

    let id = manager
        .enqueue(operation("upload_record"), EnqueueOptions::default())
        .unwrap();

    let failed = wait_for(
        || {
            manager
                .get(&id)
                .map(|item| item.status == ItemStatus::Failed)
                .unwrap_or(false)
        },
        5_000,
    )
    .await;
    assert!(failed, "operation should terminalize after retries");

    let item = manager.get(&id).unwrap();
    assert_eq!(item.attempts, 2);
    assert_eq!(failing.call_count(), 3);
    assert!(item.last_error.is_some());

    manager.destroy().await.unwrap();
    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn test_cancel_in_flight_is_cooperative() {
    let db_path = "/tmp/opsync_test_cancel_inflight.db";
    let _ = std::fs::remove_file(db_path);

    let executor = Arc::new(MockSyncExecutor::new(MockBehavior::Hang(400)));
    let manager = manager_on_db(db_path, fast_config(), executor).await;
    manager.initialize().await.unwrap();

    let id = manager
        .enqueue(operation("upload_record"), EnqueueOptions::default())
        .unwrap();

    let processing = wait_for(
        || {
            manager
                .get(&id)
                .map(|item| item.status == ItemStatus::Processing)
                .unwrap_or(false)
        },
        2_000,
    )
    .await;
    assert!(processing);

    // Cancel while in flight: the flag is set, no preemption
    assert!(manager.cancel(&id).unwrap());
    assert_eq!(manager.get(&id).unwrap().status, ItemStatus::Processing);

    // The worker observes the flag once the transport call returns
    let cancelled = wait_for(
        || {
            manager
                .get(&id)
                .map(|item| item.status == ItemStatus::Cancelled)
                .unwrap_or(false)
        },
        2_000,
    )
    .await;
    assert!(cancelled, "cancellation should be observed cooperatively");

    manager.destroy().await.unwrap();
    let _ = std::fs::remove_file(db_path);
}
