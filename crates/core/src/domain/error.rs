// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid item state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Invalid priority: {0}")]
    InvalidPriority(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
