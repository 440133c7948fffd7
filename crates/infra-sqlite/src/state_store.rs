// SQLite StateStore Implementation

use async_trait::async_trait;
use opsync_core::error::{QueueError, Result};
use opsync_core::port::{StateStore, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

/// SQLite-backed snapshot store.
///
/// One row per key; saves replace the previous value atomically.
pub struct SqliteStateStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteStateStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        let now = self.time_provider.now_millis();
        sqlx::query(
            "INSERT INTO snapshots (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Persistence(e.to_string()))?;

        debug!(key = %key, bytes = value.len(), "Snapshot saved");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT value FROM snapshots WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueueError::Persistence(e.to_string()))?;

        Ok(row.map(|(value,)| value))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM snapshots WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Persistence(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use opsync_core::port::time_provider::SystemTimeProvider;

    async fn store() -> SqliteStateStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteStateStore::new(pool, Arc::new(SystemTimeProvider))
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let store = store().await;
        store.save("queue_items", b"[1,2,3]").await.unwrap();

        let loaded = store.load("queue_items").await.unwrap();
        assert_eq!(loaded, Some(b"[1,2,3]".to_vec()));
    }

    #[tokio::test]
    async fn test_load_missing_key_is_none() {
        let store = store().await;
        assert_eq!(store.load("never_saved").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_value() {
        let store = store().await;
        store.save("alerts", b"old").await.unwrap();
        store.save("alerts", b"new").await.unwrap();

        assert_eq!(store.load("alerts").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = store().await;
        store.save("scaling_history", b"x").await.unwrap();
        store.delete("scaling_history").await.unwrap();
        store.delete("scaling_history").await.unwrap();

        assert_eq!(store.load("scaling_history").await.unwrap(), None);
    }
}
