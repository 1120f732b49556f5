//! HTTP handlers for the upload session endpoints.
//!
//! Chunk bodies stream straight through to the chunk store; everything else
//! is JSON in, JSON out. Session semantics live in `UploadService` — the
//! handlers only translate between the wire and the service.

use crate::errors::UploadError;
use crate::services::AppService;
use crate::services::upload_service::UploadStatusView;
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::io;
use uuid::Uuid;

/// Request body for `POST /upload/start`.
#[derive(Debug, Deserialize)]
pub struct StartUploadReq {
    pub file_name: String,
    pub file_size: i64,
}

/// Query params for `POST /upload/{session_id}/chunk`.
#[derive(Debug, Deserialize)]
pub struct ChunkQuery {
    pub index: u64,
}

/// `POST /upload/start` — create a session, returning its id and chunk size.
pub async fn start_upload(
    State(service): State<AppService>,
    Json(req): Json<StartUploadReq>,
) -> Result<impl IntoResponse, UploadError> {
    let created = service.create_session(&req.file_name, req.file_size).await?;
    Ok(Json(json!({
        "session_id": created.session_id,
        "chunk_size": created.chunk_size,
    })))
}

/// `POST /upload/{session_id}/chunk?index=N` — store one chunk body.
pub async fn upload_chunk(
    State(service): State<AppService>,
    Path(session_id): Path<String>,
    Query(query): Query<ChunkQuery>,
    body: Body,
) -> Result<impl IntoResponse, UploadError> {
    let session_id = parse_session_id(&session_id)?;
    let stream = body
        .into_data_stream()
        .map(|piece| piece.map_err(io::Error::other));

    let ack = service.upload_chunk(session_id, query.index, stream).await?;
    Ok(Json(json!({
        "message": "Chunk uploaded successfully.",
        "session_id": ack.session_id,
        "index": ack.index,
        "uploaded_size": ack.uploaded_size,
    })))
}

/// `GET /upload/status/{session_id}` — progress view with missing indices.
pub async fn upload_status(
    State(service): State<AppService>,
    Path(session_id): Path<String>,
) -> Result<Json<UploadStatusView>, UploadError> {
    let session_id = parse_session_id(&session_id)?;
    let status = service.upload_status(session_id).await?;
    Ok(Json(status))
}

/// `POST /upload/complete/{session_id}` — assemble and finish the upload.
pub async fn complete_upload(
    State(service): State<AppService>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, UploadError> {
    let session_id = parse_session_id(&session_id)?;
    let done = service.complete_upload(session_id).await?;
    Ok(Json(json!({
        "message": "File upload completed successfully.",
        "session_id": done.session_id,
        "file_name": done.file_name,
        "status": "success",
    })))
}

/// `POST /upload/complete` without a session id is always a 400.
pub async fn complete_upload_missing_id() -> UploadError {
    UploadError::validation("Missing session_id in URL.")
}

/// `DELETE /upload/{session_id}` — cancel the session and drop its chunks.
/// Idempotent: deleting an unknown session still succeeds.
pub async fn delete_session(
    State(service): State<AppService>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, UploadError> {
    let session_id = parse_session_id(&session_id)?;
    service.delete_session(session_id).await?;
    Ok(Json(json!({
        "message": "Session deleted.",
        "session_id": session_id,
    })))
}

fn parse_session_id(raw: &str) -> Result<Uuid, UploadError> {
    Uuid::parse_str(raw)
        .map_err(|_| UploadError::Validation(format!("Invalid session id `{raw}`.")))
}
