// State Store Port
// Key/value persistence used to survive process restarts. Absence of a
// key on load is not an error: it is an empty-queue startup.

use crate::error::Result;
use async_trait::async_trait;

/// Persistence interface for queue snapshots, alerts, and scaling history
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a value under a key, replacing any previous value
    async fn save(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Load the value for a key; None if never saved
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove a key; removing an absent key is a no-op
    async fn delete(&self, key: &str) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory state store for tests and ephemeral deployments
    #[derive(Default)]
    pub struct MemoryStateStore {
        data: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryStateStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn keys(&self) -> Vec<String> {
            self.data.lock().unwrap().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl StateStore for MemoryStateStore {
        async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.data.lock().unwrap().remove(key);
            Ok(())
        }
    }
}
