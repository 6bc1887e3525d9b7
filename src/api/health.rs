//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
    /// Seconds since the server started.
    pub uptime: f64,
    pub environment: String,
}

/// GET /health - Liveness probe.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "OK",
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime: state.started.elapsed().as_secs_f64(),
        environment: state.config.environment.to_string(),
    })
}
