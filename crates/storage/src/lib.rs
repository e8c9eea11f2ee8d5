//! Filesystem chunk storage for depot.
//!
//! Chunk bytes live at `<base>/<file_name>/<chunk_number>`. This crate owns
//! the streaming chunk writes, directory lifecycle, and the advisory
//! free-space accountant that gates new uploads.

pub mod error;
pub mod filesystem;
pub mod space;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use filesystem::FilesystemStore;
pub use space::SpaceAccountant;
pub use traits::ChunkStore;
