//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{FileChunkRow, FileRow, NewFile};
use crate::repos::{ChunkRepo, FileRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use depot_core::FileStatus;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::path::Path;
use std::time::Duration;
use time::OffsetDateTime;

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from individual connection parameters
    /// and apply the schema.
    pub async fn from_params(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        database: &str,
        connect_timeout_secs: u64,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .username(user)
            .database(database);
        if !password.is_empty() {
            opts = opts.password(password);
        }

        // Log connection info without the password.
        tracing::info!(host, port, database, user, "Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs.max(1)))
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        for statement in schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

#[async_trait]
impl FileRepo for PostgresStore {
    async fn create_file_with_chunks(
        &self,
        file: &NewFile,
        file_dir: &Path,
        now: OffsetDateTime,
    ) -> MetadataResult<FileRow> {
        let mut tx = self.pool.begin().await?;

        let row: FileRow = sqlx::query_as(
            "INSERT INTO files (name, size, checksum, chunk_size, status, total_chunks, uploaded_chunks, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $7) RETURNING *",
        )
        .bind(&file.name)
        .bind(file.size as i64)
        .bind(&file.checksum)
        .bind(file.chunk_size as i64)
        .bind(FileStatus::Initialized.as_str())
        .bind(file.total_chunks as i64)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| MetadataError::from_sqlx(e, &format!("file '{}'", file.name)))?;

        for chunk_number in 0..file.total_chunks as i64 {
            let file_path = file_dir.join(chunk_number.to_string());
            sqlx::query(
                "INSERT INTO file_chunks (parent_id, chunk_number, status, file_path, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $5)",
            )
            .bind(row.id)
            .bind(chunk_number)
            .bind(FileStatus::Initialized.as_str())
            .bind(file_path.to_string_lossy().into_owned())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(row)
    }

    async fn get_file_by_name(&self, name: &str) -> MetadataResult<Option<FileRow>> {
        let row = sqlx::query_as("SELECT * FROM files WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_file_by_id(&self, id: i64) -> MetadataResult<Option<FileRow>> {
        let row = sqlx::query_as("SELECT * FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_uploaded_names(&self) -> MetadataResult<Vec<String>> {
        let names = sqlx::query_scalar("SELECT name FROM files WHERE status = $1")
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
        let result = sqlx::query("UPDATE files SET status = $1, updated_at = $2 WHERE id = $3")
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
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
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
impl ChunkRepo for PostgresStore {
    async fn get_chunk(
        &self,
        parent_id: i64,
        chunk_number: i64,
    ) -> MetadataResult<Option<FileChunkRow>> {
        let row = sqlx::query_as(
            "SELECT * FROM file_chunks WHERE parent_id = $1 AND chunk_number = $2",
        )
        .bind(parent_id)
        .bind(chunk_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_chunks_by_parent(&self, parent_id: i64) -> MetadataResult<Vec<FileChunkRow>> {
        let rows = sqlx::query_as("SELECT * FROM file_chunks WHERE parent_id = $1 ORDER BY chunk_number")
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_pending_chunks(&self, parent_id: i64) -> MetadataResult<Vec<FileChunkRow>> {
        let rows =
            sqlx::query_as("SELECT * FROM file_chunks WHERE parent_id = $1 AND status != $2 ORDER BY chunk_number")
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
        let result =
            sqlx::query("UPDATE file_chunks SET status = $1, updated_at = $2 WHERE id = $3")
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
        sqlx::query("UPDATE files SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(file_status.as_str())
            .bind(now)
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE file_chunks SET status = $1, updated_at = $2 WHERE id = $3")
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
        sqlx::query("UPDATE file_chunks SET status = $1, updated_at = $2 WHERE id = ANY($3)")
            .bind(FileStatus::Initialized.as_str())
            .bind(now)
            .bind(chunk_ids)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE files SET status = $1, updated_at = $2 WHERE id = $3")
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

        sqlx::query("UPDATE file_chunks SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(FileStatus::Uploaded.as_str())
            .bind(now)
            .bind(chunk_id)
            .execute(&mut *tx)
            .await?;

        // Increment-and-read-back under the row's write lock so that only
        // one of two concurrently completing chunks observes the final count.
        let (uploaded, total): (i64, i64) = sqlx::query_as(
            "UPDATE files SET uploaded_chunks = uploaded_chunks + 1, updated_at = $1 \
             WHERE id = $2 RETURNING uploaded_chunks, total_chunks",
        )
        .bind(now)
        .bind(file_id)
        .fetch_one(&mut *tx)
        .await?;

        if uploaded >= total {
            sqlx::query("UPDATE files SET status = $1, updated_at = $2 WHERE id = $3")
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
        sqlx::query("UPDATE files SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(FileStatus::DeleteInProgress.as_str())
            .bind(now)
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE file_chunks SET status = $1, updated_at = $2 WHERE parent_id = $3")
            .bind(FileStatus::DeleteInProgress.as_str())
            .bind(now)
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Embedded PostgreSQL schema.
const POSTGRES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    size BIGINT NOT NULL,
    checksum TEXT NOT NULL,
    chunk_size BIGINT NOT NULL,
    status TEXT NOT NULL DEFAULT 'INITIALIZED',
    total_chunks BIGINT NOT NULL,
    uploaded_chunks BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_files_name ON files(name);
CREATE INDEX IF NOT EXISTS idx_files_status ON files(status);

CREATE TABLE IF NOT EXISTS file_chunks (
    id BIGSERIAL PRIMARY KEY,
    parent_id BIGINT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    chunk_number BIGINT NOT NULL,
    status TEXT NOT NULL DEFAULT 'INITIALIZED',
    file_path TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_file_chunks_parent_number ON file_chunks(parent_id, chunk_number);
CREATE INDEX IF NOT EXISTS idx_file_chunks_parent_status ON file_chunks(parent_id, status);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_split() {
        let statements = schema_statements(POSTGRES_SCHEMA);
        assert!(statements.len() >= 6);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS files"));
        assert!(statements.iter().all(|s| !s.is_empty()));
    }
}
