//! Health check and Prometheus endpoints

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};

/// GET /health - liveness probe, plain text
pub async fn health() -> &'static str {
    "ok"
}

/// GET /metrics - Prometheus text exposition format
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics_handle.as_ref() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "Metrics not enabled".to_string()),
    }
}
