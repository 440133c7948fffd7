// Sync Executor Port
// Abstraction over the remote synchronization transport. The only blocking
// call the queue makes; implementations must be safely retriable
// (idempotent or tolerant of duplicate delivery).

use crate::domain::operation::{ErrorClass, Operation};
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by the sync transport, classified for retry policy
#[derive(Error, Debug, Clone)]
#[error("{class}: {message}")]
pub struct SyncError {
    pub class: ErrorClass,
    pub message: String,
}

impl SyncError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

/// Sync executor trait
///
/// Implementations ship one operation to the remote target. Errors carry
/// the transport's classification; anything it cannot classify is
/// `ErrorClass::Unclassified`.
#[async_trait]
pub trait SyncExecutor: Send + Sync {
    /// Execute one operation against the remote target
    async fn execute(&self, operation: &Operation) -> Result<(), SyncError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Scripted executor behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Always fail with the given classification
        Fail(ErrorClass, String),
        /// Hang for N ms then succeed (for timeout testing)
        Hang(u64),
        /// Panic with message (for panic isolation testing)
        Panic(String),
    }

    /// Mock sync executor with a behavior script and call counting.
    ///
    /// With a script, behaviors are consumed front-to-back and the last
    /// one repeats; without one, the default behavior applies to every
    /// call.
    pub struct MockSyncExecutor {
        default_behavior: Mutex<MockBehavior>,
        script: Mutex<VecDeque<MockBehavior>>,
        call_count: Arc<Mutex<usize>>,
    }

    impl MockSyncExecutor {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                default_behavior: Mutex::new(behavior),
                script: Mutex::new(VecDeque::new()),
                call_count: Arc::new(Mutex::new(0)),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(class: ErrorClass, message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(class, message.into()))
        }

        /// Queue behaviors consumed one per call before the default applies
        pub fn push_script(&self, behavior: MockBehavior) {
            self.script.lock().unwrap().push_back(behavior);
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.default_behavior.lock().unwrap() = behavior;
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl SyncExecutor for MockSyncExecutor {
        async fn execute(&self, _operation: &Operation) -> Result<(), SyncError> {
            *self.call_count.lock().unwrap() += 1;

            let behavior = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.default_behavior.lock().unwrap().clone());

            match behavior {
                MockBehavior::Success => Ok(()),
                MockBehavior::Fail(class, msg) => Err(SyncError::new(class, msg)),
                MockBehavior::Hang(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(())
                }
                MockBehavior::Panic(msg) => panic!("{}", msg),
            }
        }
    }
}
