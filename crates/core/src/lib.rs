//! Core domain types and shared logic for the depot file-storage service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - File and chunk records and their status machine
//! - Validated file names and content checksums
//! - Wire types shared between the server and the client
//! - Configuration loaded from the environment

pub mod api;
pub mod checksum;
pub mod config;
pub mod error;
pub mod file;

pub use checksum::{Checksum, ChecksumHasher};
pub use error::{Error, Result};
pub use file::{File, FileName, FileStatus, total_chunks_for};

/// Default chunk size used by the client: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Default streaming buffer size for chunk writes on the server: 1 MiB.
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 1024 * 1024;

/// Maximum accepted file name length in bytes.
pub const MAX_FILE_NAME_LEN: usize = 255;
