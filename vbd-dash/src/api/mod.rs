//! HTTP API handlers for vbd-dash

pub mod export;
pub mod health;
pub mod metrics;
pub mod models;
pub mod runs;

pub use export::export_csv;
pub use health::health_routes;
pub use metrics::get_metrics;
pub use models::get_model_info;
pub use runs::get_runs;
