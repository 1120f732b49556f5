//! Error taxonomy for the upload service and its HTTP mapping.
//!
//! The service layer never swallows a store error: everything funnels into
//! [`UploadError`], and the boundary maps each kind onto a status code and a
//! structured `{message, code, details?}` body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::io;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    /// Malformed or missing input: empty file name, non-positive size,
    /// out-of-range chunk index, absent or unparseable session id.
    #[error("{0}")]
    Validation(String),

    /// The session id does not address a live record.
    #[error("Session `{0}` not found.")]
    SessionNotFound(Uuid),

    /// Completion attempted while chunks are still missing. Carries the
    /// sorted list of missing indices.
    #[error("File upload incomplete. Some chunks are still missing.")]
    MissingChunks(Vec<u64>),

    /// A stored session row failed validation on read.
    #[error("session record `{id}` is corrupt: {reason}")]
    CorruptRecord { id: Uuid, reason: String },

    /// The admission gate stayed full past the acquire timeout.
    #[error("Server is handling too many uploads. Retry later.")]
    Saturated,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type UploadResult<T> = Result<T, UploadError>;

impl UploadError {
    pub fn validation(msg: impl Into<String>) -> Self {
        UploadError::Validation(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            UploadError::Validation(_) => StatusCode::BAD_REQUEST,
            UploadError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            UploadError::MissingChunks(_) => StatusCode::CONFLICT,
            UploadError::Saturated => StatusCode::SERVICE_UNAVAILABLE,
            UploadError::CorruptRecord { .. } | UploadError::Sqlx(_) | UploadError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self);
        }

        let mut body = json!({
            "message": self.to_string(),
            "code": status.as_u16(),
        });
        if let UploadError::MissingChunks(missing) = &self {
            body["details"] = json!({ "missing_chunks": missing });
        }

        (status, Json(body)).into_response()
    }
}
