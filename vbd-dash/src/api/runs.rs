//! Run table endpoint

use axum::{
    extract::{Query, State},
    Json,
};

use crate::error::ApiResult;
use crate::projection::{self, TableInfo, ViewOptions};
use crate::AppState;

/// GET /api/runs?order_by_date=&include_run_name=
///
/// Projected rows of the cached corpus with their column schema and
/// header tooltips. The epoch blob is present in rows but not in `columns`.
/// 404 until a snapshot has been loaded.
pub async fn get_runs(
    State(state): State<AppState>,
    Query(options): Query<ViewOptions>,
) -> ApiResult<Json<TableInfo>> {
    let corpus = state.cache.corpus().await?;
    Ok(Json(projection::project(&corpus, &state.resolver, options)))
}
