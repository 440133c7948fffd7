//! Opsync Sync Engine - Main Entry Point

mod settings;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use opsync_core::application::QueueManager;
use opsync_core::port::id_provider::UuidProvider;
use opsync_core::port::time_provider::SystemTimeProvider;
use opsync_core::port::{ConsoleChannel, NotificationChannel};
use opsync_infra_sqlite::{create_pool, run_migrations, SqliteStateStore};
use opsync_infra_system::{HttpSyncExecutor, SysinfoResourceProbe};
use settings::DaemonSettings;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_CONFIG_PATH: &str = "opsync.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (pretty for development, JSON for production)
    let log_format = std::env::var("OPSYNC_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("opsync=info"))
        .expect("Failed to create env filter");

    // Optional non-blocking file logging next to the console output
    let file_guard = match std::env::var("OPSYNC_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "opsyncd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            match log_format.as_str() {
                "json" => {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().json())
                        .with(fmt::layer().json().with_ansi(false).with_writer(writer))
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().pretty())
                        .with(fmt::layer().with_ansi(false).with_writer(writer))
                        .init();
                }
            }
            Some(guard)
        }
        Err(_) => {
            match log_format.as_str() {
                "json" => {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().json())
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().pretty())
                        .init();
                }
            }
            None
        }
    };
    // Keep the appender guard alive for the process lifetime
    let _file_guard = file_guard;

    info!("Opsync Sync Engine v{} starting...", VERSION);

    // 2. Load configuration
    let config_path =
        std::env::var("OPSYNC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let settings = DaemonSettings::load(&config_path)?;
    let db_path = settings.resolved_db_path()?;

    info!(db_path = %db_path, "Initializing snapshot store...");

    // 3. Initialize database
    let pool = create_pool(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let store = Arc::new(SqliteStateStore::new(pool, time_provider.clone()));
    let probe = Arc::new(SysinfoResourceProbe::new());
    let executor = Arc::new(HttpSyncExecutor::new(
        settings.sync_endpoint.clone(),
        Duration::from_millis(settings.manager.queue.operation_timeout_ms),
    ));
    let channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(ConsoleChannel)];

    // 5. Construct the manager; an invalid configuration aborts here
    let manager = Arc::new(QueueManager::new(
        settings.manager,
        executor,
        store,
        probe,
        channels,
        time_provider,
        id_provider,
    )?);

    // 6. Initialize: restore persisted state, start workers and timers
    info!(sync_endpoint = %settings.sync_endpoint, "Starting queue manager...");
    manager.initialize().await?;

    info!("System ready. Waiting for operations...");
    info!("Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown: stop tasks and persist a final snapshot
    manager.destroy().await?;

    info!("Shutdown complete.");

    Ok(())
}
