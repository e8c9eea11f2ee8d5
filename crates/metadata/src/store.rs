//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{FileChunkRow, FileRow, NewFile};
use crate::repos::{ChunkRepo, FileRepo};
use async_trait::async_trait;
use depot_core::FileStatus;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: FileRepo + ChunkRepo + Send + Sync {
    /// Apply the embedded schema.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MetadataError::Config(format!("cannot create database directory: {e}"))
            })?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids "database is locked" failures under server concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl FileRepo for SqliteStore {
    async fn create_file_with_chunks(
        &self,
        file: &NewFile,
        file_dir: &Path,
        now: OffsetDateTime,
    ) -> MetadataResult<FileRow> {
        let mut tx = self.pool.begin().await?;

        let row: FileRow = sqlx::query_as(
            "INSERT INTO files (name, size, checksum, chunk_size, status, total_chunks, uploaded_chunks, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?) RETURNING *",
        )
        .bind(&file.name)
        .bind(file.size as i64)
        .bind(&file.checksum)
        .bind(file.chunk_size as i64)
        .bind(FileStatus::Initialized.as_str())
        .bind(file.total_chunks as i64)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| MetadataError::from_sqlx(e, &format!("file '{}'", file.name)))?;

        for chunk_number in 0..file.total_chunks as i64 {
            let file_path = file_dir.join(chunk_number.to_string());
            sqlx::query(
                "INSERT INTO file_chunks (parent_id, chunk_number, status, file_path, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(row.id)
            .bind(chunk_number)
            .bind(FileStatus::Initialized.as_str())
            .bind(file_path.to_string_lossy().into_owned())
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(row)
    }

    async fn get_file_by_name(&self, name: &str) -> MetadataResult<Option<FileRow>> {
        let row = sqlx::query_as("SELECT * FROM files WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_file_by_id(&self, id: i64) -> MetadataResult<Option<FileRow>> {
        let row = sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_uploaded_names(&self) -> MetadataResult<Vec<String>> {
        let names = sqlx::query_scalar("SELECT name FROM files WHERE status = ?")
            .bind(FileStatus::Uploaded.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn update_file_status(
        &self,
        id: i64,
        status: FileStatus,
        now: OffsetDateTime,
    ) -> MetadataResult<()> {
        let result = sqlx::query("UPDATE files SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("file id {id}")));
        }
        Ok(())
    }

    async fn delete_file(&self, id: i64) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("file id {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkRepo for SqliteStore {
    async fn get_chunk(
        &self,
        parent_id: i64,
        chunk_number: i64,
    ) -> MetadataResult<Option<FileChunkRow>> {
        let row =
            sqlx::query_as("SELECT * FROM file_chunks WHERE parent_id = ? AND chunk_number = ?")
                .bind(parent_id)
                .bind(chunk_number)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn get_chunks_by_parent(&self, parent_id: i64) -> MetadataResult<Vec<FileChunkRow>> {
        let rows = sqlx::query_as("SELECT * FROM file_chunks WHERE parent_id = ? ORDER BY chunk_number")
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_pending_chunks(&self, parent_id: i64) -> MetadataResult<Vec<FileChunkRow>> {
        let rows =
            sqlx::query_as("SELECT * FROM file_chunks WHERE parent_id = ? AND status != ? ORDER BY chunk_number")
                .bind(parent_id)
                .bind(FileStatus::Uploaded.as_str())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn update_chunk_status(
        &self,
        chunk_id: i64,
        status: FileStatus,
        now: OffsetDateTime,
    ) -> MetadataResult<()> {
        let result = sqlx::query("UPDATE file_chunks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(chunk_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("chunk id {chunk_id}")));
        }
        Ok(())
    }

    async fn set_file_and_chunk_status(
        &self,
        file_id: i64,
        chunk_id: i64,
        file_status: FileStatus,
        chunk_status: FileStatus,
        now: OffsetDateTime,
    ) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE files SET status = ?, updated_at = ? WHERE id = ?")
            .bind(file_status.as_str())
            .bind(now)
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE file_chunks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(chunk_status.as_str())
            .bind(now)
            .bind(chunk_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reset_chunks_for_resume(
        &self,
        file_id: i64,
        chunk_ids: &[i64],
        now: OffsetDateTime,
    ) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        for chunk_id in chunk_ids {
            sqlx::query("UPDATE file_chunks SET status = ?, updated_at = ? WHERE id = ?")
                .bind(FileStatus::Initialized.as_str())
                .bind(now)
                .bind(chunk_id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("UPDATE files SET status = ?, updated_at = ? WHERE id = ?")
            .bind(FileStatus::Initialized.as_str())
            .bind(now)
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn complete_chunk(
        &self,
        file_id: i64,
        chunk_id: i64,
        now: OffsetDateTime,
    ) -> MetadataResult<(u64, u64)> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE file_chunks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(FileStatus::Uploaded.as_str())
            .bind(now)
            .bind(chunk_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE files SET uploaded_chunks = uploaded_chunks + 1, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(file_id)
        .execute(&mut *tx)
        .await?;

        let (uploaded, total): (i64, i64) =
            sqlx::query_as("SELECT uploaded_chunks, total_chunks FROM files WHERE id = ?")
                .bind(file_id)
                .fetch_one(&mut *tx)
                .await?;

        if uploaded >= total {
            sqlx::query("UPDATE files SET status = ?, updated_at = ? WHERE id = ?")
                .bind(FileStatus::Uploaded.as_str())
                .bind(now)
                .bind(file_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok((uploaded as u64, total as u64))
    }

    async fn mark_delete_in_progress(
        &self,
        file_id: i64,
        now: OffsetDateTime,
    ) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE files SET status = ?, updated_at = ? WHERE id = ?")
            .bind(FileStatus::DeleteInProgress.as_str())
            .bind(now)
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE file_chunks SET status = ?, updated_at = ? WHERE parent_id = ?")
            .bind(FileStatus::DeleteInProgress.as_str())
            .bind(now)
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Embedded SQLite schema.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    size INTEGER NOT NULL,
    checksum TEXT NOT NULL,
    chunk_size INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'INITIALIZED',
    total_chunks INTEGER NOT NULL,
    uploaded_chunks INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_files_name ON files(name);
CREATE INDEX IF NOT EXISTS idx_files_status ON files(status);

CREATE TABLE IF NOT EXISTS file_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    chunk_number INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'INITIALIZED',
    file_path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_file_chunks_parent_number ON file_chunks(parent_id, chunk_number);
CREATE INDEX IF NOT EXISTS idx_file_chunks_parent_status ON file_chunks(parent_id, status);
"#;
