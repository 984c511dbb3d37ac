//! Liveness plus snapshot freshness

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    /// Time of the last successful snapshot load, null before the first
    pub snapshot_loaded_at: Option<DateTime<Utc>>,
}

/// GET /health
///
/// Answers `ok` even before a snapshot exists.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        module: "vbd-dash",
        version: env!("CARGO_PKG_VERSION"),
        snapshot_loaded_at: state.cache.loaded_at().await,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
