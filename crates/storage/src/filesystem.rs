//! Local filesystem chunk store.

use crate::error::{StorageError, StorageResult};
use crate::traits::ChunkStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::instrument;

/// Filesystem-backed chunk store rooted at the base storage directory.
pub struct FilesystemStore {
    root: PathBuf,
    buffer_size: usize,
}

impl FilesystemStore {
    /// Create a new store, creating the base directory if missing.
    pub async fn new(root: impl AsRef<Path>, buffer_size: usize) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root, buffer_size })
    }

    /// The base storage directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate that a file name cannot escape the storage root.
    ///
    /// Names are validated at the API boundary too; this guard keeps the
    /// storage layer safe on its own.
    fn checked_name<'a>(&self, file_name: &'a str) -> StorageResult<&'a str> {
        if file_name.is_empty()
            || file_name == "."
            || file_name == ".."
            || file_name.contains('/')
            || file_name.contains('\\')
        {
            return Err(StorageError::InvalidPath(format!(
                "unsafe file name: {file_name}"
            )));
        }
        Ok(file_name)
    }
}

#[async_trait]
impl ChunkStore for FilesystemStore {
    fn file_dir(&self, file_name: &str) -> StorageResult<PathBuf> {
        Ok(self.root.join(self.checked_name(file_name)?))
    }

    fn chunk_path(&self, file_name: &str, chunk_number: u64) -> StorageResult<PathBuf> {
        Ok(self
            .root
            .join(self.checked_name(file_name)?)
            .join(chunk_number.to_string()))
    }

    #[instrument(skip(self))]
    async fn create_dir(&self, dir: &Path) -> StorageResult<()> {
        fs::create_dir_all(dir).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_dir(&self, dir: &Path) -> StorageResult<()> {
        match fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self, reader))]
    async fn write_chunk(
        &self,
        path: &Path,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<u64> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(path).await?;
        let mut buf = vec![0u8; self.buffer_size];
        let mut written = 0u64;

        loop {
            // A failing read means the request body went away under us
            // (client disconnect or broken transfer), not a storage fault.
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| StorageError::Cancelled(e.to_string()))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            written += n as u64;
        }

        file.flush().await?;
        Ok(written)
    }

    #[instrument(skip(self))]
    async fn delete_chunk(&self, path: &Path) -> StorageResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, path: &Path) -> StorageResult<bool> {
        fs::try_exists(path).await.map_err(StorageError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn new_store() -> (tempfile::TempDir, FilesystemStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(temp.path(), 8).await.unwrap();
        (temp, store)
    }

    #[tokio::test]
    async fn test_write_chunk_roundtrip() {
        let (_temp, store) = new_store().await;
        let path = store.chunk_path("f.bin", 0).unwrap();

        // Buffer size 8 forces multiple read iterations.
        let data = b"a chunk body longer than the stream buffer";
        let mut reader = &data[..];
        let written = store.write_chunk(&path, &mut reader).await.unwrap();

        assert_eq!(written, data.len() as u64);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_delete_chunk_is_idempotent() {
        let (_temp, store) = new_store().await;
        let path = store.chunk_path("f.bin", 1).unwrap();

        let mut reader = &b"x"[..];
        store.write_chunk(&path, &mut reader).await.unwrap();
        assert!(store.exists(&path).await.unwrap());

        store.delete_chunk(&path).await.unwrap();
        assert!(!store.exists(&path).await.unwrap());
        // Second delete of a missing file is fine.
        store.delete_chunk(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_dir_recursive() {
        let (_temp, store) = new_store().await;
        let dir = store.file_dir("nested").unwrap();
        store.create_dir(&dir).await.unwrap();

        let path = store.chunk_path("nested", 0).unwrap();
        let mut reader = &b"y"[..];
        store.write_chunk(&path, &mut reader).await.unwrap();

        store.remove_dir(&dir).await.unwrap();
        assert!(!store.exists(&dir).await.unwrap());
        store.remove_dir(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_unsafe_names_rejected() {
        let (_temp, store) = new_store().await;
        assert!(store.file_dir("..").is_err());
        assert!(store.file_dir("a/b").is_err());
        assert!(store.chunk_path("a\\b", 0).is_err());
        assert!(store.file_dir("").is_err());
    }
}
