//! Health check endpoint.
//!
//! Used by load balancers and orchestrators to verify the process is alive.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests
    pub status: &'static str,
    /// Service name
    pub service: String,
    /// Whole seconds since startup
    pub uptime_seconds: u64,
}

/// Liveness check.
///
/// Returns 200 OK while the process is running. This endpoint does NOT check
/// dependencies (database, broker).
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "ok",
///   "service": "user-service",
///   "uptimeSeconds": 42
/// }
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            service: state.service().to_string(),
            uptime_seconds: state.uptime().as_secs(),
        }),
    )
}
