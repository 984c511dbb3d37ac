//! CSV export of the raw snapshot

use std::collections::BTreeSet;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use vbd_common::{FieldMap, RunRecord};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/export.csv
pub async fn export_csv(State(state): State<AppState>) -> ApiResult<Response> {
    let corpus = state.cache.corpus().await?;
    let bytes = corpus_to_csv(&corpus)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"data.csv\""),
        ],
        bytes,
    )
        .into_response())
}

/// One row per record; the header is the sorted union of field names
///
/// Nested values are written as JSON text, missing fields and nulls as
/// empty cells.
pub fn corpus_to_csv(corpus: &[RunRecord]) -> ApiResult<Vec<u8>> {
    let rows: Vec<FieldMap> = corpus.iter().cloned().map(RunRecord::into_fields).collect();
    let header: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    if !header.is_empty() {
        writer.write_record(&header).map_err(csv_error)?;
    }
    for row in &rows {
        let cells = header.iter().map(|key| cell(row.get(*key)));
        writer.write_record(cells).map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV export failed: {}", e)))
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn csv_error(e: csv::Error) -> ApiError {
    ApiError::Internal(format!("CSV export failed: {}", e))
}
