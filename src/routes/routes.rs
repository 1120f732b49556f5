//! Defines routes for the chunked-upload API.
//!
//! ## Structure
//! - **Session lifecycle**
//!   - `POST   /upload/start` — create a session
//!   - `POST   /upload/complete/{session_id}` — assemble and finish
//!   - `POST   /upload/complete` — always 400 (missing id)
//!   - `DELETE /upload/{session_id}` — cancel and clean up
//!
//! - **Chunk transfer & progress**
//!   - `POST /upload/{session_id}/chunk?index=N` — store one chunk
//!   - `GET  /upload/status/{session_id}` — progress and missing indices
//!
//! The chunk route carries raw binary bodies up to the chunk-size cap, so
//! its body limit is raised above axum's default.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::{
            complete_upload, complete_upload_missing_id, delete_session, start_upload,
            upload_chunk, upload_status,
        },
    },
    models::session::MAX_CHUNK_SIZE,
    services::AppService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

/// Build and return the router for all upload routes.
///
/// The router carries shared state (`AppService`) to all handlers.
pub fn routes() -> Router<AppService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Session lifecycle
        .route("/upload/start", post(start_upload))
        .route("/upload/complete", post(complete_upload_missing_id))
        .route("/upload/complete/{session_id}", post(complete_upload))
        .route("/upload/status/{session_id}", get(upload_status))
        .route("/upload/{session_id}", delete(delete_session))
        // Chunk transfer: allow bodies up to one full chunk plus slack
        .route(
            "/upload/{session_id}/chunk",
            post(upload_chunk).layer(DefaultBodyLimit::max(MAX_CHUNK_SIZE as usize + 64 * 1024)),
        )
}
