//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
