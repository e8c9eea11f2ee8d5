//! Configuration loaded from the environment.
//!
//! Both processes are configured purely through environment variables; the
//! flat structs below bind the documented variable names (e.g. `PORT`,
//! `BASE_STORAGE_DIR`, `SERVER_URL`) via figment with serde defaults.

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration (env: `PORT`, `BASE_STORAGE_DIR`, ...).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base directory for chunk storage.
    #[serde(default = "default_base_storage_dir")]
    pub base_storage_dir: PathBuf,
    /// Maximum accepted total_size for a single upload, in bytes.
    #[serde(default = "default_upload_size_limit")]
    pub upload_size_limit: u64,
    /// Seconds after which an IN_PROGRESS upload counts as orphaned.
    #[serde(default = "default_upload_timeout_second")]
    pub upload_timeout_second: u64,
    /// Database host. Empty selects the embedded SQLite store.
    #[serde(default)]
    pub db_host: String,
    /// Database port.
    #[serde(default = "default_db_port")]
    pub db_port: u16,
    /// Database user.
    #[serde(default = "default_db_user")]
    pub db_user: String,
    /// Database password.
    #[serde(default)]
    pub db_password: String,
    /// Database name.
    #[serde(default = "default_db_name")]
    pub db_name: String,
    /// Database connect timeout in seconds.
    #[serde(default = "default_db_conn_timeout")]
    pub db_conn_timeout: u64,
    /// Worker pool size for the chunk-delete fan-out.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Buffer size for streaming chunk writes, in bytes.
    #[serde(default = "default_stream_buffer_size")]
    pub stream_buffer_size: usize,
}

fn default_port() -> u16 {
    8080
}

fn default_base_storage_dir() -> PathBuf {
    PathBuf::from("./data/storage")
}

fn default_upload_size_limit() -> u64 {
    100 * 1024 * 1024 // 100 MiB
}

fn default_upload_timeout_second() -> u64 {
    300
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_name() -> String {
    "depot".to_string()
}

fn default_db_conn_timeout() -> u64 {
    10
}

fn default_worker_pool_size() -> usize {
    5
}

fn default_stream_buffer_size() -> usize {
    crate::DEFAULT_STREAM_BUFFER_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            base_storage_dir: default_base_storage_dir(),
            upload_size_limit: default_upload_size_limit(),
            upload_timeout_second: default_upload_timeout_second(),
            db_host: String::new(),
            db_port: default_db_port(),
            db_user: default_db_user(),
            db_password: String::new(),
            db_name: default_db_name(),
            db_conn_timeout: default_db_conn_timeout(),
            worker_pool_size: default_worker_pool_size(),
            stream_buffer_size: default_stream_buffer_size(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> crate::Result<Self> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::raw().only(&[
                "port",
                "base_storage_dir",
                "upload_size_limit",
                "upload_timeout_second",
                "db_host",
                "db_port",
                "db_user",
                "db_password",
                "db_name",
                "db_conn_timeout",
                "worker_pool_size",
                "stream_buffer_size",
            ]))
            .extract()
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        if self.stream_buffer_size == 0 {
            return Err(crate::Error::Config(
                "STREAM_BUFFER_SIZE must be greater than 0".to_string(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(crate::Error::Config(
                "WORKER_POOL_SIZE must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// The upload timeout as a std Duration.
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_second)
    }

    /// Derive the metadata store selection from the DB fields.
    pub fn metadata_config(&self) -> MetadataConfig {
        if self.db_host.is_empty() {
            MetadataConfig::Sqlite {
                path: PathBuf::from("./data/metadata.db"),
            }
        } else {
            MetadataConfig::Postgres {
                host: self.db_host.clone(),
                port: self.db_port,
                user: self.db_user.clone(),
                password: self.db_password.clone(),
                database: self.db_name.clone(),
                connect_timeout_secs: self.db_conn_timeout,
            }
        }
    }
}

/// Metadata store selection derived from the server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// Embedded SQLite database (local runs and tests).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
        connect_timeout_secs: u64,
    },
}
