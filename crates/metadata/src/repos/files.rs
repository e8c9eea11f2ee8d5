//! File repository.

use crate::error::MetadataResult;
use crate::models::{FileRow, NewFile};
use async_trait::async_trait;
use depot_core::FileStatus;
use std::path::Path;
use time::OffsetDateTime;

/// Repository for file-level operations.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Create a file row and all of its chunk rows in a single transaction.
    ///
    /// Every chunk row is created as INITIALIZED with its `file_path` set to
    /// `<file_dir>/<chunk_number>`, where `file_dir` is the directory that
    /// holds the file's chunks. A unique-index violation on the name
    /// surfaces as a `Constraint` error.
    async fn create_file_with_chunks(
        &self,
        file: &NewFile,
        file_dir: &Path,
        now: OffsetDateTime,
    ) -> MetadataResult<FileRow>;

    /// Get a file by name, or None.
    async fn get_file_by_name(&self, name: &str) -> MetadataResult<Option<FileRow>>;

    /// Get a file by id, or None.
    async fn get_file_by_id(&self, id: i64) -> MetadataResult<Option<FileRow>>;

    /// Names of all files whose status is UPLOADED. Ordering unspecified.
    async fn list_uploaded_names(&self) -> MetadataResult<Vec<String>>;

    /// Update a file's status (and its `updated_at`).
    async fn update_file_status(
        &self,
        id: i64,
        status: FileStatus,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Delete a file row. The schema cascades to its chunk rows; this is the
    /// only path that removes chunk rows.
    async fn delete_file(&self, id: i64) -> MetadataResult<()>;
}
