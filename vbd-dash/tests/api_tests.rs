//! Integration tests for vbd-dash API endpoints
//!
//! Tests cover:
//! - Health endpoint
//! - Run table projection and view switches
//! - Model display information
//! - Metric pickers
//! - CSV export

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot` method
use vbd_common::{snapshot, FieldMap, RunRecord};
use vbd_dash::{build_router, AppState, SnapshotCache};

fn record(value: Value) -> RunRecord {
    let fields: FieldMap = serde_json::from_value(value).unwrap();
    RunRecord::from_fields(fields)
}

fn sample_corpus() -> Vec<RunRecord> {
    vec![
        record(json!({
            "run_name": "vit_run", "run_date": "03.01.2024 12:00:00",
            "model": "vit_tiny_patch16", "top_val_acc1": 0.72,
            "flops": 1260000000_i64,
            "epoch_data": {"0": {"acc1": 0.5, "time": 3600.0}},
        })),
        record(json!({
            "run_name": "swin_run", "run_date": "01.01.2024 12:00:00",
            "model": "swin_tiny_window7", "top_val_acc1": 0.81,
            "epoch_data": {},
        })),
        record(json!({"run_name": "unfinished", "model": "deit_small"})),
    ]
}

/// Test helper: Create app over an in-memory corpus
fn setup_app(corpus: Vec<RunRecord>) -> axum::Router {
    let cache = SnapshotCache::with_corpus("unused.json", corpus);
    build_router(AppState::new(Arc::new(cache)))
}

fn test_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app(Vec::new());

    let response = app.oneshot(test_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "vbd-dash");
    assert!(body["version"].is_string());
    assert!(body["snapshot_loaded_at"].is_string());
}

#[tokio::test]
async fn test_health_before_first_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(SnapshotCache::new(dir.path().join("data.json")));
    let app = build_router(AppState::new(cache));

    let response = app.oneshot(test_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert!(body["snapshot_loaded_at"].is_null());
}

// =============================================================================
// Run table
// =============================================================================

#[tokio::test]
async fn test_runs_default_view() {
    let app = setup_app(sample_corpus());

    let response = app.oneshot(test_request("/api/runs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;

    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2, "record without run date is dropped");
    assert_eq!(rows[0]["model"], "ViT-Ti/16");
    assert_eq!(rows[0]["taxonomy class"], "Baseline");
    assert_eq!(rows[0]["GFLOPs"], json!(1.26));
    assert_eq!(rows[1]["taxonomy class"], "Sparse Attention");

    let blob: Value = serde_json::from_str(rows[0]["epoch_data"].as_str().unwrap()).unwrap();
    assert_eq!(blob["0"]["training time per epoch [h*GPUs]"], json!(1.0));

    let columns = body["columns"].as_array().unwrap();
    assert_eq!(columns[0], json!({"name": "model", "id": "model"}));
    assert!(columns.iter().all(|c| c["name"] != "epoch_data"));
    assert!(columns.iter().all(|c| c["name"] != "run name"));

    assert_eq!(
        body["tooltips"]["model"],
        json!({"value": "model", "use_with": "header"})
    );
}

#[tokio::test]
async fn test_runs_ordered_by_date_with_run_name() {
    let app = setup_app(sample_corpus());

    let response = app
        .oneshot(test_request("/api/runs?order_by_date=true&include_run_name=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;

    let names: Vec<_> = body["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["run name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["vit_run", "swin_run"]);

    let columns: Vec<_> = body["columns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(&columns[..3], &["run name", "run date", "model"]);
}

#[tokio::test]
async fn test_runs_rejects_malformed_switch() {
    let app = setup_app(sample_corpus());

    let response = app
        .oneshot(test_request("/api/runs?order_by_date=sometimes"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Model display information
// =============================================================================

#[tokio::test]
async fn test_model_info_known_model() {
    let app = setup_app(Vec::new());

    let response = app
        .oneshot(test_request("/api/models/deit_small_patch16_224"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;

    assert_eq!(body["canonical_name"], "DeiT-S-224/16");
    assert_eq!(body["category"], "Baseline");
    assert_eq!(body["marker"], "o");
    assert!(body["color"].as_str().unwrap().starts_with('#'));
    assert!(body["edge_color"].is_string());
    assert!(body["legend_order"].is_object());
}

#[tokio::test]
async fn test_model_info_unknown_model_is_unclassified() {
    let app = setup_app(Vec::new());

    let response = app
        .oneshot(test_request("/api/models/mystery_net"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;

    assert_eq!(body["category"], "none");
    assert_eq!(body["color"], "black");
}

#[tokio::test]
async fn test_model_info_blank_name_is_bad_request() {
    let app = setup_app(Vec::new());

    let response = app.oneshot(test_request("/api/models/%20")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

// =============================================================================
// Metrics and export
// =============================================================================

#[tokio::test]
async fn test_metrics_lists() {
    let app = setup_app(Vec::new());

    let response = app.oneshot(test_request("/api/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;

    let points = body["point_metrics"].as_array().unwrap();
    assert!(points.contains(&json!("GFLOPs")));
    assert!(points.contains(&json!("top-1 validation accuracy")));

    let per_epoch = body["per_epoch_metrics"].as_array().unwrap();
    assert!(per_epoch.contains(&json!("top-1 training accuracy")));
}

#[tokio::test]
async fn test_export_csv() {
    let app = setup_app(sample_corpus());

    let response = app.oneshot(test_request("/api/export.csv")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let mut lines = text.lines();

    let header_line = lines.next().unwrap();
    assert!(header_line.starts_with("epoch_data,flops,model,run_date,run_name"));
    assert_eq!(lines.count(), 3, "export includes every raw record");
}

// =============================================================================
// Snapshot polling
// =============================================================================

#[tokio::test]
async fn test_runs_served_from_published_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    snapshot::publish(&path, &sample_corpus()).unwrap();

    let cache = Arc::new(SnapshotCache::new(&path));
    cache.refresh().await.unwrap();
    let app = build_router(AppState::new(cache));

    let response = app.oneshot(test_request("/api/runs")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["rows"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_runs_not_found_before_first_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(SnapshotCache::new(dir.path().join("data.json")));
    assert!(cache.refresh().await.is_err());
    let app = build_router(AppState::new(cache));

    let response = app
        .clone()
        .oneshot(test_request("/api/runs"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let response = app.oneshot(test_request("/api/export.csv")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
