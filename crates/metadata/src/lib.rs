//! Metadata store abstraction and implementations for depot.
//!
//! This crate provides the control-plane data model:
//! - File records and their status machine
//! - Per-chunk status tracking
//! - The transactional transitions the upload engine builds on

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use postgres::PostgresStore;
pub use store::{MetadataStore, SqliteStore};

use depot_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            tracing::info!(path = %path.display(), "Using SQLite metadata store");
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        MetadataConfig::Postgres {
            host,
            port,
            user,
            password,
            database,
            connect_timeout_secs,
        } => {
            let store = PostgresStore::from_params(
                host,
                *port,
                user,
                password,
                database,
                *connect_timeout_secs,
            )
            .await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
