//! Log record extraction
//!
//! Parses one training log into a [`RunRecord`] with a single forward pass
//! over its lines, then applies the post-pass corrections in
//! [`postprocess::finalize`].
//!
//! Merge precedence per rule:
//! - current arguments: existing record fields win
//! - old arguments: existing record fields win (prefixed by the old task,
//!   or unprefixed for evaluation runs)
//! - efficiency metrics (pairs and literal): incoming values win

pub mod coerce;
pub mod patterns;
pub mod postprocess;

use std::path::Path;

use serde_json::Value;
use tracing::warn;
use vbd_common::merge::prefixed;
use vbd_common::record::{RUN_NAME, TASK};
use vbd_common::{FieldMap, Precedence, RunRecord};

use crate::error::ExtractError;
use coerce::{
    coerce_efficiency_value, coerce_epoch_value, normalize_python_literal, normalize_quotes,
    parse_mapping,
};
use patterns::LogLine;

/// Extract the run record of one log file
///
/// Invalid UTF-8 is replaced rather than rejected.
pub fn extract_file(path: &Path) -> Result<RunRecord, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Io(path.to_path_buf(), e))?;
    let text = String::from_utf8_lossy(&bytes);
    extract_str(&text, &path.display().to_string())
}

/// Extract a run record from log text; `source` only labels diagnostics
pub fn extract_str(text: &str, source: &str) -> Result<RunRecord, ExtractError> {
    let mut record = RunRecord::new();
    for line in text.lines() {
        if let Some(parsed) = patterns::classify(line) {
            apply_line(&mut record, parsed, line, source)?;
        }
    }
    postprocess::finalize(&mut record);
    Ok(record)
}

fn apply_line(
    record: &mut RunRecord,
    parsed: LogLine<'_>,
    line: &str,
    source: &str,
) -> Result<(), ExtractError> {
    match parsed {
        LogLine::Device(device) => {
            record.device = Some(device.to_string());
        }
        LogLine::Arguments(literal) => {
            if let Some(args) = parse_literal(&normalize_python_literal(literal), source) {
                record.absorb(args, Precedence::Base);
            }
        }
        LogLine::OldArguments(literal) => {
            if let Some(old_args) = parse_literal(&normalize_python_literal(literal), source) {
                merge_old_arguments(record, old_args);
            }
        }
        LogLine::ExperimentId(raw) => match raw.trim().parse::<i64>() {
            Ok(id) => record.experiment_id = Some(id),
            Err(_) => warn!(file = source, "Unparsable experiment id {:?}", raw),
        },
        LogLine::RunDate { date, run_name } => {
            record.run_date = Some(date);
            if !record.contains(RUN_NAME) {
                let name = run_name.ok_or_else(|| ExtractError::MissingRunName {
                    line: line.to_string(),
                })?;
                record.run_name = Some(name.to_string());
            }
        }
        LogLine::Epoch { epoch, pairs } => {
            let Ok(epoch) = epoch.parse::<u32>() else {
                warn!(file = source, "Epoch number out of range: {}", epoch);
                return Ok(());
            };
            let metrics = record.epoch_data.entry(epoch).or_default();
            for (key, value) in pairs {
                metrics.insert(key.to_string(), coerce_epoch_value(value));
            }
        }
        LogLine::EfficiencyPairs(pairs) => {
            let metrics: FieldMap = pairs
                .into_iter()
                .map(|(key, value)| (key.to_string(), coerce_efficiency_value(value)))
                .collect();
            record.absorb(metrics, Precedence::Incoming);
        }
        LogLine::EfficiencyLiteral(literal) => {
            if let Some(metrics) = parse_literal(&normalize_quotes(literal), source) {
                record.absorb(metrics, Precedence::Incoming);
            }
        }
    }
    Ok(())
}

/// Fold a legacy `old_args` block into the record
///
/// Blocks without a `task` are ignored. Evaluation runs take the old fields
/// as they are; all other runs get them prefixed with the old task name.
/// Fields already on the record always win.
fn merge_old_arguments(record: &mut RunRecord, old_args: FieldMap) {
    let Some(old_task) = old_args.get(TASK).map(task_label) else {
        return;
    };
    let is_eval = record.task.as_deref().is_some_and(|task| task.contains("eval"));
    let incoming = if is_eval {
        old_args
    } else {
        prefixed(old_args, &old_task)
    };
    record.absorb(incoming, Precedence::Base);
}

fn task_label(task: &Value) -> String {
    match task {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_literal(json: &str, source: &str) -> Option<FieldMap> {
    match parse_mapping(json) {
        Ok(fields) => Some(fields),
        Err(e) => {
            warn!(file = source, "Could not decode {:?}: {}", json, e);
            None
        }
    }
}
