//! File chunk repository.

use crate::error::MetadataResult;
use crate::models::FileChunkRow;
use async_trait::async_trait;
use depot_core::FileStatus;
use time::OffsetDateTime;

/// Repository for chunk-level operations and the transactional transitions
/// that couple a chunk's status to its parent file's status.
#[async_trait]
pub trait ChunkRepo: Send + Sync {
    /// Get one chunk by `(parent_id, chunk_number)`, or None.
    async fn get_chunk(
        &self,
        parent_id: i64,
        chunk_number: i64,
    ) -> MetadataResult<Option<FileChunkRow>>;

    /// All chunks of a file.
    async fn get_chunks_by_parent(&self, parent_id: i64) -> MetadataResult<Vec<FileChunkRow>>;

    /// Chunks of a file whose status is not UPLOADED (the missing set).
    async fn get_pending_chunks(&self, parent_id: i64) -> MetadataResult<Vec<FileChunkRow>>;

    /// Update one chunk's status.
    async fn update_chunk_status(
        &self,
        chunk_id: i64,
        status: FileStatus,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Set the file and one chunk to the given statuses in one transaction.
    /// Used for the INITIALIZED -> IN_PROGRESS promotion at the start of a
    /// chunk write and for fail recovery (both -> FAILED).
    async fn set_file_and_chunk_status(
        &self,
        file_id: i64,
        chunk_id: i64,
        file_status: FileStatus,
        chunk_status: FileStatus,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Reset the listed chunks and the file itself to INITIALIZED in one
    /// transaction. The missing set must only be revealed to a client after
    /// this commits.
    async fn reset_chunks_for_resume(
        &self,
        file_id: i64,
        chunk_ids: &[i64],
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Complete a chunk: set it UPLOADED, increment the file's
    /// `uploaded_chunks` and read the counter back under the same
    /// transaction, promoting the file to UPLOADED when the counter reaches
    /// `total_chunks`. Returns `(uploaded_chunks, total_chunks)`.
    ///
    /// Two chunks finishing concurrently must not both observe a counter
    /// below `total_chunks`; the increment-and-read-back runs under the
    /// file row's write lock, so exactly one caller sees the final count.
    async fn complete_chunk(
        &self,
        file_id: i64,
        chunk_id: i64,
        now: OffsetDateTime,
    ) -> MetadataResult<(u64, u64)>;

    /// Set the file and all of its chunks to DELETE_IN_PROGRESS in one
    /// transaction, ahead of the delete fan-out.
    async fn mark_delete_in_progress(
        &self,
        file_id: i64,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;
}
