//! Wire types shared between the server and the client.

use crate::checksum::Checksum;
use crate::file::{File, FileStatus};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Request body for `POST /api/v1/files/upload/init/{file_name}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitUploadRequest {
    /// Hex SHA-256 of the full file content.
    pub checksum: Checksum,
    /// Total byte length of the file.
    pub total_size: u64,
    /// Number of chunks the client will send.
    pub total_chunks: u64,
    /// Uniform chunk size in bytes (the last chunk may be smaller).
    pub chunk_size: u64,
    /// Whether this init resumes a previously interrupted upload.
    #[serde(default)]
    pub is_reupload: bool,
}

/// Chunks still needing data for a resumed upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MissingChunkInfo {
    /// The file's declared chunk size; every missing chunk is at most this big.
    pub max_size: u64,
    /// Chunk numbers whose status is not UPLOADED. Order is not promised.
    pub chunk_numbers: Vec<u64>,
}

/// Response body for a successful init.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitUploadResponse {
    /// The file id, used as the upload id for chunk writes.
    pub upload_id: u64,
    /// Present (and non-empty) only when resuming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_chunk_info: Option<MissingChunkInfo>,
}

/// Response body for a successful chunk write.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadChunkResponse {
    /// Always "OK".
    pub status: String,
}

impl UploadChunkResponse {
    /// The canonical success response.
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }
}

/// Response body for `GET /api/v1/files/{file_name}`.
///
/// `upload_timeout_second` is the server-configured upload timeout in whole
/// seconds; the client uses it to judge whether an IN_PROGRESS upload held by
/// another client is orphaned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileStatsResponse {
    pub id: u64,
    pub name: String,
    pub size: u64,
    pub checksum: Checksum,
    pub status: FileStatus,
    pub total_chunks: u64,
    pub uploaded_chunks: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub upload_timeout_second: u64,
}

impl FileStatsResponse {
    /// Build a stats response from a file record.
    pub fn from_file(file: File, upload_timeout_second: u64) -> Self {
        Self {
            id: file.id,
            name: file.name,
            size: file.size,
            checksum: file.checksum,
            status: file.status,
            total_chunks: file.total_chunks,
            uploaded_chunks: file.uploaded_chunks,
            created_at: file.created_at,
            updated_at: file.updated_at,
            upload_timeout_second,
        }
    }
}

/// Response body for `GET /api/v1/files`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListFilesResponse {
    /// Names of all files whose status is UPLOADED.
    pub files: Vec<String>,
}

/// Error body returned by every failing endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Machine code: INVALID_INPUT, NOT_FOUND, DATABASE, FILE_STORAGE or CONTEXT.
    pub code: String,
    /// The HTTP status the response was sent with.
    pub status_code: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_response_omits_empty_missing_info() {
        let response = InitUploadResponse {
            upload_id: 7,
            missing_chunk_info: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("missing_chunk_info").is_none());
        assert_eq!(json["upload_id"], 7);
    }

    #[test]
    fn test_init_request_reupload_defaults_false() {
        let json = r#"{"checksum":"b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9","total_size":11,"total_chunks":3,"chunk_size":4}"#;
        let request: InitUploadRequest = serde_json::from_str(json).unwrap();
        assert!(!request.is_reupload);
        assert_eq!(request.total_chunks, 3);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&FileStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }
}
