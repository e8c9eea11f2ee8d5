//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use depot_core::{Checksum, File, FileStatus};
use sqlx::FromRow;
use time::OffsetDateTime;

/// A row of the `files` table.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub id: i64,
    pub name: String,
    pub size: i64,
    pub checksum: String,
    pub chunk_size: i64,
    pub status: String,
    pub total_chunks: i64,
    pub uploaded_chunks: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl FileRow {
    /// Parse the stored status string.
    pub fn status(&self) -> MetadataResult<FileStatus> {
        FileStatus::parse(&self.status)
            .map_err(|e| MetadataError::Internal(format!("file {}: {e}", self.id)))
    }

    /// Convert into the domain record.
    pub fn to_file(&self) -> MetadataResult<File> {
        Ok(File {
            id: self.id as u64,
            name: self.name.clone(),
            size: self.size as u64,
            checksum: Checksum::parse(&self.checksum)
                .map_err(|e| MetadataError::Internal(format!("file {}: {e}", self.id)))?,
            chunk_size: self.chunk_size as u64,
            status: self.status()?,
            total_chunks: self.total_chunks as u64,
            uploaded_chunks: self.uploaded_chunks as u64,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// A row of the `file_chunks` table.
#[derive(Debug, Clone, FromRow)]
pub struct FileChunkRow {
    pub id: i64,
    pub parent_id: i64,
    pub chunk_number: i64,
    pub status: String,
    pub file_path: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl FileChunkRow {
    /// Parse the stored status string.
    pub fn status(&self) -> MetadataResult<FileStatus> {
        FileStatus::parse(&self.status)
            .map_err(|e| MetadataError::Internal(format!("chunk {}: {e}", self.id)))
    }
}

/// Parameters for creating a file together with its chunk rows.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub size: u64,
    pub checksum: String,
    pub chunk_size: u64,
    pub total_chunks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> FileRow {
        let now = OffsetDateTime::now_utc();
        FileRow {
            id: 42,
            name: "sample.bin".to_string(),
            size: 2048,
            checksum: Checksum::compute(b"sample").to_hex(),
            chunk_size: 1024,
            status: "IN_PROGRESS".to_string(),
            total_chunks: 2,
            uploaded_chunks: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_to_file() {
        let row = sample_row();
        let file = row.to_file().unwrap();
        assert_eq!(file.id, 42);
        assert_eq!(file.status, FileStatus::InProgress);
        assert_eq!(file.total_chunks, 2);
    }

    #[test]
    fn test_to_file_rejects_bad_status() {
        let mut row = sample_row();
        row.status = "BOGUS".to_string();
        assert!(row.to_file().is_err());
    }
}
