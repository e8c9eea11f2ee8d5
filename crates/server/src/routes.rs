//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Chunk bodies can be as large as a whole chunk; axum's default 2 MiB
    // body limit would reject them. The upload size limit is the outer bound.
    let body_limit = usize::try_from(state.config.upload_size_limit).unwrap_or(usize::MAX);

    let api_v1 = Router::new()
        .route("/files/upload/init/{file_name}", post(handlers::init_upload))
        .route(
            "/files/upload/{file_id}/{chunk_number}",
            post(handlers::upload_chunk),
        )
        .route(
            "/files/{file_name}",
            get(handlers::get_file_stats).delete(handlers::delete_file),
        )
        .route("/files", get(handlers::list_files));

    Router::new()
        // Health check (unauthenticated, for load balancers and probes)
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_v1)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
