//! Upload handlers: init and the chunk ingest path.

use crate::error::{ApiError, ApiResult};
use crate::handlers::files::parse_name;
use crate::state::AppState;
use async_compression::tokio::bufread::GzipDecoder;
use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::header::CONTENT_ENCODING;
use axum::Json;
use depot_core::api::{InitUploadRequest, InitUploadResponse, MissingChunkInfo, UploadChunkResponse};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

/// POST /api/v1/files/upload/init/{file_name} - initialize or resume an upload.
#[tracing::instrument(skip(state, body))]
pub async fn init_upload(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<InitUploadResponse>> {
    let name = parse_name(&file_name)?;
    let request: InitUploadRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidInput(format!("invalid request body: {e}")))?;

    let (file, missing) = state.engine.init_upload(&name, &request).await?;

    let missing_chunk_info = (!missing.is_empty()).then(|| MissingChunkInfo {
        max_size: file.chunk_size as u64,
        chunk_numbers: missing,
    });

    Ok(Json(InitUploadResponse {
        upload_id: file.id as u64,
        missing_chunk_info,
    }))
}

/// POST /api/v1/files/upload/{file_id}/{chunk_number} - write one chunk.
///
/// The body is the raw chunk bytes, optionally `Content-Encoding: gzip`.
/// The write runs in its own task: if the client disconnects, this handler
/// future is dropped but the task keeps running, observes the body failure,
/// and performs fail recovery on a context that is not tied to the request.
#[tracing::instrument(skip(state, request))]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((file_id, chunk_number)): Path<(String, String)>,
    request: Request,
) -> ApiResult<Json<UploadChunkResponse>> {
    let file_id: u64 = file_id
        .parse()
        .map_err(|_| ApiError::InvalidInput(format!("invalid file ID: {file_id}")))?;
    let chunk_number: u64 = chunk_number
        .parse()
        .map_err(|_| ApiError::InvalidInput(format!("invalid chunk number: {chunk_number}")))?;

    let gzip = request
        .headers()
        .get(CONTENT_ENCODING)
        .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"gzip"));

    let body = request.into_body().into_data_stream();
    let engine = state.engine.clone();

    let task = tokio::spawn(async move {
        let reader = StreamReader::new(body.map_err(std::io::Error::other));
        let result = if gzip {
            let mut decoder = GzipDecoder::new(reader);
            engine.write_chunk(file_id, chunk_number, &mut decoder).await
        } else {
            let mut reader = reader;
            engine.write_chunk(file_id, chunk_number, &mut reader).await
        };

        if let Err(err) = result {
            if let Err(recovery_err) = engine.fail_recovery(file_id, chunk_number).await {
                tracing::warn!(
                    file_id,
                    chunk_number,
                    error = %recovery_err,
                    "Fail recovery after chunk write error failed"
                );
            }
            return Err(err);
        }
        Ok(())
    });

    match task.await {
        Ok(Ok(())) => Ok(Json(UploadChunkResponse::ok())),
        Ok(Err(err)) => Err(err),
        Err(join_err) => Err(ApiError::Context(format!(
            "chunk write task failed: {join_err}"
        ))),
    }
}
