//! Application state shared across handlers.

use crate::engine::UploadEngine;
use depot_core::config::ServerConfig;
use depot_metadata::MetadataStore;
use depot_storage::{ChunkStore, SpaceAccountant};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Metadata store (exposed for tests and health checks).
    pub metadata: Arc<dyn MetadataStore>,
    /// The upload state engine.
    pub engine: Arc<UploadEngine>,
}

impl AppState {
    /// Create a new application state, wiring the engine to its stores.
    pub fn new(
        config: ServerConfig,
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn ChunkStore>,
        space: Arc<SpaceAccountant>,
    ) -> Self {
        let config = Arc::new(config);
        let engine = Arc::new(UploadEngine::new(
            config.clone(),
            metadata.clone(),
            storage,
            space,
        ));
        Self {
            config,
            metadata,
            engine,
        }
    }
}
