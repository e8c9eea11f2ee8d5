//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;

/// Chunk store abstraction over the on-disk layout `<base>/<file_name>/<chunk_number>`.
#[async_trait]
pub trait ChunkStore: Send + Sync + 'static {
    /// The directory that holds a file's chunks.
    fn file_dir(&self, file_name: &str) -> StorageResult<PathBuf>;

    /// The path of a single chunk.
    fn chunk_path(&self, file_name: &str, chunk_number: u64) -> StorageResult<PathBuf>;

    /// Create a directory (and any missing parents).
    async fn create_dir(&self, dir: &Path) -> StorageResult<()>;

    /// Recursively remove a directory. A missing directory is not an error.
    async fn remove_dir(&self, dir: &Path) -> StorageResult<()>;

    /// Stream `reader` to `path` using a fixed-size buffer, returning the
    /// number of bytes written. Reader failures (client disconnect mid-body)
    /// map to `Cancelled`; filesystem failures map to `Io`.
    async fn write_chunk(
        &self,
        path: &Path,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<u64>;

    /// Delete a chunk file. A missing file is not an error.
    async fn delete_chunk(&self, path: &Path) -> StorageResult<()>;

    /// Whether a file exists at `path`.
    async fn exists(&self, path: &Path) -> StorageResult<bool>;
}
