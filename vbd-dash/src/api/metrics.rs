//! Metric pickers endpoint

use axum::Json;
use serde::Serialize;

use crate::projection;

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    /// Columns usable as scatter plot axes
    pub point_metrics: Vec<&'static str>,
    /// Series available in the per-epoch blob
    pub per_epoch_metrics: Vec<&'static str>,
}

/// GET /api/metrics
pub async fn get_metrics() -> Json<MetricsResponse> {
    Json(MetricsResponse {
        point_metrics: projection::point_metrics(),
        per_epoch_metrics: projection::per_epoch_metric_names(),
    })
}
