use axum::{extract::State, Json};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub environment: String,
    pub timestamp: String,
    pub version: &'static str,
}

/// GET /health - Liveness probe; no authentication.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        environment: state.config.environment.clone(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        version: env!("CARGO_PKG_VERSION"),
    })
}
