// Central Error Type for the Engine

use crate::domain::operation::ErrorClass;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Queue capacity exceeded: {size}/{max}")]
    CapacityExceeded { size: usize, max: usize },

    #[error("Operation already active: {0}")]
    DuplicateActive(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Operation timed out: {id} after {timeout_ms}ms")]
    OperationTimeout { id: String, timeout_ms: u64 },

    #[error("Operation failed: {id} ({class})")]
    OperationFailed { id: String, class: ErrorClass },

    #[error("Retry exhausted: {id} after {attempts} attempts")]
    RetryExhausted { id: String, attempts: u32 },

    #[error("Invalid lifecycle state: expected {expected}, was {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using QueueError
pub type Result<T> = std::result::Result<T, QueueError>;

// From implementation for infra crates (to avoid circular dependency)
impl From<String> for QueueError {
    fn from(err: String) -> Self {
        QueueError::Persistence(err)
    }
}

// Note: sqlx::Error conversion is handled in the infra-sqlite crate
// by converting to QueueError::Persistence(String)
