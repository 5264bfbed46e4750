//! `/health` and `/metrics` endpoints.

use std::time::Instant;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::errors::ApiError;
use crate::server::AppState;

/// Service name reported by `/health`.
pub const SERVICE_NAME: &str = "GoMess";

/// Service description reported by `/health`.
pub const SERVICE_DESCRIPTION: &str = "GoMess is a simple messaging service";

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Service name.
    pub name: String,
    /// Crate version.
    pub version: String,
    /// One-line description.
    pub description: String,
    /// Configured server id.
    pub server_id: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Currently registered WebSocket connections.
    pub connections: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, server_id: &str, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        name: SERVICE_NAME.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        description: SERVICE_DESCRIPTION.into(),
        server_id: server_id.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_check(
        state.start_time,
        &state.config.server_id,
        state.hub.connection_count(),
    ))
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => ApiError::not_found().into_response(),
    }
}
