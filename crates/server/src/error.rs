//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use depot_core::api::ErrorBody;
use depot_metadata::MetadataError;
use depot_storage::StorageError;

/// API error type. Every error carries one of the five machine codes
/// `INVALID_INPUT`, `NOT_FOUND`, `DATABASE`, `FILE_STORAGE`, `CONTEXT`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] MetadataError),

    #[error("file storage error: {0}")]
    FileStorage(#[from] StorageError),

    #[error("context cancelled: {0}")]
    Context(String),
}

impl ApiError {
    /// Get the machine code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Database(e) => match e {
                MetadataError::NotFound(_) => "NOT_FOUND",
                _ => "DATABASE",
            },
            Self::FileStorage(e) => match e {
                StorageError::Cancelled(_) => "CONTEXT",
                StorageError::InvalidPath(_) => "INVALID_INPUT",
                _ => "FILE_STORAGE",
            },
            Self::Context(_) => "CONTEXT",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self.code() {
            "INVALID_INPUT" => StatusCode::BAD_REQUEST,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code().to_string(),
            status_code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
