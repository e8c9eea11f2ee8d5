//! HTTP server for the depot file-storage service.

pub mod engine;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use engine::UploadEngine;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
