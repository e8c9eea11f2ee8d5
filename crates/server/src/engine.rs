//! Upload state engine.
//!
//! Owns the authoritative per-file / per-chunk status machine, admission
//! control, and the free-space gate. Handlers are thin HTTP wrappers around
//! the operations here.

use crate::error::{ApiError, ApiResult};
use depot_core::api::InitUploadRequest;
use depot_core::config::ServerConfig;
use depot_core::{total_chunks_for, File, FileName, FileStatus};
use depot_metadata::models::{FileRow, NewFile};
use depot_metadata::{MetadataError, MetadataStore};
use depot_storage::{ChunkStore, SpaceAccountant, StorageError};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::io::AsyncRead;

/// The server side of the cross-actor upload state machine.
pub struct UploadEngine {
    config: Arc<ServerConfig>,
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn ChunkStore>,
    space: Arc<SpaceAccountant>,
}

impl UploadEngine {
    /// Create a new engine.
    pub fn new(
        config: Arc<ServerConfig>,
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn ChunkStore>,
        space: Arc<SpaceAccountant>,
    ) -> Self {
        Self {
            config,
            metadata,
            storage,
            space,
        }
    }

    /// The metadata store backing this engine.
    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// The free-space accountant backing this engine.
    pub fn space(&self) -> &Arc<SpaceAccountant> {
        &self.space
    }

    /// Initialize (or resume) an upload.
    ///
    /// Decision table over the existing row, given same checksum and size
    /// (different content always fails with INVALID_INPUT):
    ///
    /// | existing status        | is_reupload | outcome                          |
    /// |------------------------|-------------|----------------------------------|
    /// | (no row)               | any         | create file + chunks, reserve    |
    /// | INITIALIZED            | any         | idempotent: ensure dir, no reset |
    /// | UPLOADED               | false       | INVALID_INPUT (already exists)   |
    /// | UPLOADED               | true        | INVALID_INPUT (completed file)   |
    /// | IN_PROGRESS / FAILED   | false       | INVALID_INPUT (resume required)  |
    /// | IN_PROGRESS / FAILED   | true        | resume: reset missing set        |
    /// | DELETE_*               | any         | INVALID_INPUT (being deleted)    |
    ///
    /// Returns the file row and the chunk numbers still needing data (empty
    /// for a fresh or idempotent init).
    pub async fn init_upload(
        &self,
        name: &FileName,
        req: &InitUploadRequest,
    ) -> ApiResult<(FileRow, Vec<u64>)> {
        if req.total_size == 0 {
            return Err(ApiError::InvalidInput("file is empty".to_string()));
        }
        if req.total_size > self.config.upload_size_limit {
            return Err(ApiError::InvalidInput(format!(
                "total_size {} exceeds the upload limit of {} bytes",
                req.total_size, self.config.upload_size_limit
            )));
        }
        let expected_chunks = total_chunks_for(req.total_size, req.chunk_size)
            .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
        if expected_chunks != req.total_chunks {
            return Err(ApiError::InvalidInput(format!(
                "total_chunks {} does not match total_size {} at chunk_size {}",
                req.total_chunks, req.total_size, req.chunk_size
            )));
        }

        // Admission gate. The accountant is advisory and bounds bytes
        // accepted for upload, not bytes written.
        let available = self.space.available();
        if req.total_size > available {
            return Err(ApiError::FileStorage(StorageError::InsufficientSpace {
                requested: req.total_size,
                available,
            }));
        }

        let now = OffsetDateTime::now_utc();
        let existing = self.metadata.get_file_by_name(name.as_str()).await?;

        let Some(row) = existing else {
            return self.admit_new_file(name, req, now).await;
        };

        if row.checksum != req.checksum.to_hex() || row.size as u64 != req.total_size {
            return Err(ApiError::InvalidInput(format!(
                "'{name}' with different content already exists"
            )));
        }

        let status = row.status().map_err(ApiError::Database)?;
        if status.is_deleting() {
            return Err(ApiError::InvalidInput(format!(
                "'{name}' is being deleted"
            )));
        }

        match status {
            FileStatus::Initialized => {
                // A fresh init raced or was retried; the directory may or
                // may not exist yet.
                let dir = self.storage.file_dir(name.as_str())?;
                self.storage.create_dir(&dir).await?;
                Ok((row, Vec::new()))
            }
            FileStatus::Uploaded if req.is_reupload => Err(ApiError::InvalidInput(format!(
                "'{name}' is already uploaded and cannot be re-uploaded"
            ))),
            FileStatus::Uploaded => Err(ApiError::InvalidInput(format!(
                "'{name}' already exists"
            ))),
            FileStatus::InProgress | FileStatus::Failed if !req.is_reupload => {
                Err(ApiError::InvalidInput(format!(
                    "'{name}' already exists in {status} status; resume with is_reupload"
                )))
            }
            FileStatus::InProgress | FileStatus::Failed => self.resume_upload(name, row, now).await,
            FileStatus::DeleteInProgress => unreachable!("handled by is_deleting above"),
        }
    }

    /// Admit a brand-new file: directory first, then the file row and all
    /// chunk rows in one transaction, then the reservation.
    async fn admit_new_file(
        &self,
        name: &FileName,
        req: &InitUploadRequest,
        now: OffsetDateTime,
    ) -> ApiResult<(FileRow, Vec<u64>)> {
        let dir = self.storage.file_dir(name.as_str())?;
        self.storage.create_dir(&dir).await?;

        let new_file = NewFile {
            name: name.as_str().to_string(),
            size: req.total_size,
            checksum: req.checksum.to_hex(),
            chunk_size: req.chunk_size,
            total_chunks: req.total_chunks,
        };

        let row = match self
            .metadata
            .create_file_with_chunks(&new_file, &dir, now)
            .await
        {
            Ok(row) => row,
            Err(err) => {
                // The directory is useless without the row; clean it up
                // best-effort and let the database error win.
                if let Err(cleanup_err) = self.storage.remove_dir(&dir).await {
                    tracing::warn!(
                        file_name = %name,
                        error = %cleanup_err,
                        "Failed to remove directory after init failure"
                    );
                }
                return Err(match err {
                    MetadataError::Constraint(_) => {
                        ApiError::InvalidInput(format!("'{name}' already exists"))
                    }
                    other => ApiError::Database(other),
                });
            }
        };

        self.space.reserve(req.total_size);
        tracing::info!(
            file_id = row.id,
            file_name = %name,
            total_chunks = row.total_chunks,
            "Upload initialized"
        );
        Ok((row, Vec::new()))
    }

    /// Resume an interrupted upload: remove stray bytes for every chunk not
    /// yet UPLOADED, reset those chunks (and the file) to INITIALIZED, and
    /// only then reveal the missing set.
    async fn resume_upload(
        &self,
        name: &FileName,
        row: FileRow,
        now: OffsetDateTime,
    ) -> ApiResult<(FileRow, Vec<u64>)> {
        let pending = self.metadata.get_pending_chunks(row.id).await?;

        for chunk in &pending {
            self.storage.delete_chunk(Path::new(&chunk.file_path)).await?;
        }

        let dir = self.storage.file_dir(name.as_str())?;
        self.storage.create_dir(&dir).await?;

        let chunk_ids: Vec<i64> = pending.iter().map(|c| c.id).collect();
        self.metadata
            .reset_chunks_for_resume(row.id, &chunk_ids, now)
            .await?;

        let missing: Vec<u64> = pending.iter().map(|c| c.chunk_number as u64).collect();
        tracing::info!(
            file_id = row.id,
            file_name = %name,
            missing = missing.len(),
            "Upload resumed"
        );
        Ok((row, missing))
    }

    /// Write one chunk's bytes from `reader`.
    ///
    /// Status transitions: the chunk (and, for the first write, the file)
    /// move to IN_PROGRESS before streaming; a successful write promotes the
    /// chunk to UPLOADED and, when it was the last one, the file too. Error
    /// paths leave the chunk IN_PROGRESS for the fail-recovery hook.
    pub async fn write_chunk(
        &self,
        file_id: u64,
        chunk_number: u64,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> ApiResult<()> {
        let (file, chunk) = self.get_file_and_chunk(file_id, chunk_number).await?;

        let file_status = file.status().map_err(ApiError::Database)?;
        if !file_status.accepts_chunks() {
            return Err(ApiError::InvalidInput(format!(
                "file '{}' is {} and cannot accept chunks",
                file.name, file_status
            )));
        }
        let chunk_status = chunk.status().map_err(ApiError::Database)?;
        if chunk_status != FileStatus::Initialized {
            return Err(ApiError::InvalidInput(format!(
                "chunk {} of upload {} is {} and cannot be written",
                chunk_number, file_id, chunk_status
            )));
        }

        let now = OffsetDateTime::now_utc();
        if file_status == FileStatus::Initialized {
            self.metadata
                .set_file_and_chunk_status(
                    file.id,
                    chunk.id,
                    FileStatus::InProgress,
                    FileStatus::InProgress,
                    now,
                )
                .await?;
        } else {
            self.metadata
                .update_chunk_status(chunk.id, FileStatus::InProgress, now)
                .await?;
        }

        let written = match self
            .storage
            .write_chunk(Path::new(&chunk.file_path), reader)
            .await
        {
            Ok(written) => written,
            Err(StorageError::Cancelled(reason)) => {
                // Client went away mid-body. No transition here; the ingest
                // path invokes fail recovery on a fresh context.
                return Err(ApiError::Context(reason));
            }
            Err(err) => return Err(ApiError::FileStorage(err)),
        };

        let (uploaded, total) = self
            .metadata
            .complete_chunk(file.id, chunk.id, OffsetDateTime::now_utc())
            .await?;

        tracing::debug!(
            file_id,
            chunk_number,
            bytes = written,
            uploaded_chunks = uploaded,
            total_chunks = total,
            "Chunk written"
        );
        if uploaded == total {
            tracing::info!(file_id, file_name = %file.name, "Upload complete");
        }
        Ok(())
    }

    /// Mark a chunk and its file FAILED after a broken write. Idempotent;
    /// a chunk that already reached UPLOADED (or a file already terminal)
    /// is left untouched.
    pub async fn fail_recovery(&self, file_id: u64, chunk_number: u64) -> ApiResult<()> {
        let (file, chunk) = self.get_file_and_chunk(file_id, chunk_number).await?;

        let file_status = file.status().map_err(ApiError::Database)?;
        let chunk_status = chunk.status().map_err(ApiError::Database)?;
        if chunk_status == FileStatus::Uploaded
            || file_status == FileStatus::Uploaded
            || file_status.is_deleting()
        {
            return Ok(());
        }

        self.metadata
            .set_file_and_chunk_status(
                file.id,
                chunk.id,
                FileStatus::Failed,
                FileStatus::Failed,
                OffsetDateTime::now_utc(),
            )
            .await?;

        tracing::warn!(file_id, chunk_number, "Chunk write failed, marked FAILED");
        Ok(())
    }

    /// Delete a file: mark the delete, fan the chunk-file deletions out to a
    /// bounded worker pool, remove the directory, then drop the row (the
    /// schema cascades to chunk rows). Per-chunk deletion errors are logged
    /// and not surfaced; the row removal is the tombstone.
    pub async fn delete_file(&self, name: &FileName) -> ApiResult<()> {
        let row = self
            .metadata
            .get_file_by_name(name.as_str())
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("'{name}' not found")))?;

        let now = OffsetDateTime::now_utc();
        self.metadata.mark_delete_in_progress(row.id, now).await?;

        let chunks = self.metadata.get_chunks_by_parent(row.id).await?;
        stream::iter(chunks)
            .for_each_concurrent(self.config.worker_pool_size, |chunk| {
                let storage = self.storage.clone();
                async move {
                    if let Err(err) = storage.delete_chunk(Path::new(&chunk.file_path)).await {
                        tracing::warn!(
                            chunk_id = chunk.id,
                            file_path = %chunk.file_path,
                            error = %err,
                            "Failed to delete chunk file"
                        );
                    }
                }
            })
            .await;

        let dir = self.storage.file_dir(name.as_str())?;
        self.storage.remove_dir(&dir).await?;

        self.metadata.delete_file(row.id).await?;
        self.space.release(row.size as u64);

        tracing::info!(file_id = row.id, file_name = %name, "File deleted");
        Ok(())
    }

    /// Names of all fully uploaded files.
    pub async fn list_files(&self) -> ApiResult<Vec<String>> {
        Ok(self.metadata.list_uploaded_names().await?)
    }

    /// The file record for `name`, or None when absent.
    pub async fn get_file_stats(&self, name: &FileName) -> ApiResult<Option<File>> {
        match self.metadata.get_file_by_name(name.as_str()).await? {
            Some(row) => Ok(Some(row.to_file().map_err(ApiError::Database)?)),
            None => Ok(None),
        }
    }

    async fn get_file_and_chunk(
        &self,
        file_id: u64,
        chunk_number: u64,
    ) -> ApiResult<(FileRow, depot_metadata::models::FileChunkRow)> {
        let file = self.metadata.get_file_by_id(file_id as i64).await?;
        let chunk = self
            .metadata
            .get_chunk(file_id as i64, chunk_number as i64)
            .await?;
        match (file, chunk) {
            (Some(file), Some(chunk)) => Ok((file, chunk)),
            _ => Err(ApiError::InvalidInput(format!(
                "data not found for (file ID, chunk number) = ({file_id}, {chunk_number})"
            ))),
        }
    }
}
