//! Model display information endpoint

use axum::{
    extract::{Path, State},
    Json,
};
use vbd_common::ModelDisplayInfo;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/models/:name
///
/// Canonical name, category, marker and colours for a raw model name or a
/// category name. Unknown models resolve to the unclassified defaults.
pub async fn get_model_info(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ModelDisplayInfo>> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Model name is empty".to_string()));
    }
    Ok(Json(state.resolver.display_info(name)))
}
