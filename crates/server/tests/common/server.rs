//! Server test harness.

use depot_core::config::ServerConfig;
use depot_metadata::{MetadataStore, SqliteStore};
use depot_server::{create_router, AppState};
use depot_storage::{ChunkStore, FilesystemStore, SpaceAccountant};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A test server with all dependencies on a temp directory and SQLite.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub storage_dir: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server with default configuration.
    pub async fn new() -> Self {
        Self::build(|_| {}, None).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut ServerConfig),
    {
        Self::build(modifier, None).await
    }

    /// Create a test server whose free-space accountant starts at `available`.
    pub async fn with_space(available: u64) -> Self {
        Self::build(|_| {}, Some(available)).await
    }

    async fn build<F>(modifier: F, space: Option<u64>) -> Self
    where
        F: FnOnce(&mut ServerConfig),
    {
        let temp_dir = tempfile::tempdir().expect("failed to create temp directory");
        let storage_dir = temp_dir.path().join("storage");

        let mut config = ServerConfig {
            base_storage_dir: storage_dir.clone(),
            ..Default::default()
        };
        modifier(&mut config);

        let storage: Arc<dyn ChunkStore> = Arc::new(
            FilesystemStore::new(&config.base_storage_dir, config.stream_buffer_size)
                .await
                .expect("failed to create storage"),
        );

        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(temp_dir.path().join("metadata.db"))
                .await
                .expect("failed to create metadata store"),
        );

        // Tests want deterministic admission decisions, not the host's
        // actual disk capacity.
        let space = Arc::new(SpaceAccountant::new(space.unwrap_or(u64::MAX)));

        let state = AppState::new(config, metadata, storage, space);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            storage_dir,
            _temp_dir: temp_dir,
        }
    }

    /// Access the underlying metadata store.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }
}
