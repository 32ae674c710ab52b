//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: &'static str,
    pub version: &'static str,
}

/// GET /health: liveness plus the storage backend in use.
pub async fn check(State(storage): State<&'static str>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        storage,
        version: env!("CARGO_PKG_VERSION"),
    })
}
