//! vbd-dash library - benchmark dashboard data service
//!
//! Serves the projected run table and model display information read from
//! the published corpus snapshot.

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;
use vbd_common::TaxonomyResolver;

pub mod api;
pub mod cache;
pub mod error;
pub mod projection;

pub use cache::SnapshotCache;
pub use error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Latest loaded corpus
    pub cache: Arc<SnapshotCache>,
    pub resolver: TaxonomyResolver,
}

impl AppState {
    /// Create new application state with the built-in taxonomy
    pub fn new(cache: Arc<SnapshotCache>) -> Self {
        Self {
            cache,
            resolver: TaxonomyResolver::default(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let api = Router::new()
        .route("/api/runs", get(api::get_runs))
        .route("/api/models/:name", get(api::get_model_info))
        .route("/api/metrics", get(api::get_metrics))
        .route("/api/export.csv", get(api::export_csv));

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
