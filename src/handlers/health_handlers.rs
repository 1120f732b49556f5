//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks both stores

use crate::services::AppService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Liveness probe — always 200 with a plain JSON body, never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that pings the session record store (`SELECT 1`) and the
/// chunk store (write/read/delete round trip under the chunk root). Returns
/// 200 when both answer, 503 otherwise.
pub async fn readyz(State(service): State<AppService>) -> impl IntoResponse {
    let (sessions, chunks) = service.check_stores().await;

    let mut checks = HashMap::new();
    checks.insert(
        "sessions",
        CheckStatus {
            ok: sessions.is_ok(),
            error: sessions.err().map(|e| e.to_string()),
        },
    );
    checks.insert(
        "chunks",
        CheckStatus {
            ok: chunks.is_ok(),
            error: chunks.err().map(|e| e.to_string()),
        },
    );

    let overall_ok = checks.values().all(|c| c.ok);
    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        available_slots: service.available_slots(),
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    available_slots: usize,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
