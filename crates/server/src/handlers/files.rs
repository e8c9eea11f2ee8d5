//! File query and delete handlers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use depot_core::api::{FileStatsResponse, ListFilesResponse};
use depot_core::FileName;

/// GET /health - liveness probe.
pub async fn health() -> Json<&'static str> {
    Json("OK")
}

/// DELETE /api/v1/files/{file_name} - delete a file and its chunks.
#[tracing::instrument(skip(state))]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let name = parse_name(&file_name)?;
    state.engine.delete_file(&name).await?;
    Ok(Json(serde_json::json!({ "status": "OK" })))
}

/// GET /api/v1/files - names of all fully uploaded files.
pub async fn list_files(State(state): State<AppState>) -> ApiResult<Json<ListFilesResponse>> {
    let files = state.engine.list_files().await?;
    Ok(Json(ListFilesResponse { files }))
}

/// GET /api/v1/files/{file_name} - file stats, or JSON `null` when absent.
#[tracing::instrument(skip(state))]
pub async fn get_file_stats(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> ApiResult<Json<Option<FileStatsResponse>>> {
    let name = parse_name(&file_name)?;
    let stats = state
        .engine
        .get_file_stats(&name)
        .await?
        .map(|file| FileStatsResponse::from_file(file, state.config.upload_timeout_second));
    Ok(Json(stats))
}

pub(crate) fn parse_name(raw: &str) -> ApiResult<FileName> {
    FileName::parse(raw).map_err(|e| ApiError::InvalidInput(e.to_string()))
}
