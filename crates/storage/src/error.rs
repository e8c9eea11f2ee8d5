//! Storage error types.

use thiserror::Error;

/// Chunk storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("insufficient space: requested {requested}, available {available}")]
    InsufficientSpace { requested: u64, available: u64 },

    #[error("stream cancelled: {0}")]
    Cancelled(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
