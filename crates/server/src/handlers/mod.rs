//! HTTP request handlers.

pub mod files;
pub mod uploads;

pub use files::{delete_file, get_file_stats, health, list_files};
pub use uploads::{init_upload, upload_chunk};
