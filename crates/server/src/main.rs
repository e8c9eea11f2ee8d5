//! Depot server binary.

use anyhow::{Context, Result};
use depot_core::config::ServerConfig;
use depot_server::{create_router, AppState};
use depot_storage::{FilesystemStore, SpaceAccountant};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("depotd v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env().context("failed to load configuration")?;

    // The base directory must exist before it can be statfs'd, and chunk
    // paths recorded in the database must be absolute.
    std::fs::create_dir_all(&config.base_storage_dir)
        .with_context(|| format!("cannot create {}", config.base_storage_dir.display()))?;
    let base_dir = std::fs::canonicalize(&config.base_storage_dir)
        .context("cannot resolve base storage directory")?;
    let config = ServerConfig {
        base_storage_dir: base_dir.clone(),
        ..config
    };

    let storage = Arc::new(
        FilesystemStore::new(&base_dir, config.stream_buffer_size)
            .await
            .context("failed to initialize storage")?,
    );
    let space = Arc::new(
        SpaceAccountant::seed_from_statfs(&base_dir)
            .context("failed to read free space for the storage directory")?,
    );
    tracing::info!(
        base_dir = %base_dir.display(),
        available = space.available(),
        "Storage initialized"
    );

    let metadata = depot_metadata::from_config(&config.metadata_config())
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata store health check failed")?;
    tracing::info!("Metadata store initialized");

    let port = config.port;
    let state = AppState::new(config, metadata, storage, space);
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
