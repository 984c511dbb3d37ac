//! Corrections and derived fields applied after the line pass
//!
//! [`finalize`] runs every step in a fixed order; later steps depend on the
//! output of earlier ones (cumulative sums use device-scaled times, best
//! accuracies use unit-corrected accuracies).

use serde_json::Value;
use tracing::debug;
use vbd_common::record::as_integer;
use vbd_common::{FieldMap, Precedence, RunRecord};

use super::coerce::float_value;

/// Misspelled validation accuracy key written by older training scripts
const VALIDATION_ACCURACY_TYPO: &str = "validataion_accuracy";

/// Prefix of the pretraining phase fields carried over from old arguments
const PRETRAIN_PREFIX: &str = "pre-train";

/// Apply all post-pass corrections in order
pub fn finalize(record: &mut RunRecord) {
    scale_device_time(record);
    accumulate_times(record);
    normalize_accuracy(record, "acc1");
    normalize_accuracy(record, "val_acc1");
    extract_final_epoch(record);
    flatten_throughput(record);
    extract_best_accuracies(record);
    expand_batch_sizes(record);
}

/// Multiply every per-epoch `*time*` field by the device count
///
/// Without a known world size the times are left as wall-clock values.
pub fn scale_device_time(record: &mut RunRecord) {
    let Some(world_size) = record.world_size else {
        debug!(run = ?record.run_name, "No world_size, per-epoch times left unscaled");
        return;
    };
    for metrics in record.epoch_data.values_mut() {
        for (key, value) in metrics.iter_mut() {
            if !key.contains("time") {
                continue;
            }
            if let Some(scaled) = multiply(value, world_size) {
                *value = scaled;
            }
        }
    }
}

/// Running totals of training and validation time, plus the
/// `validataion_accuracy` → `val_acc1` rename
pub fn accumulate_times(record: &mut RunRecord) {
    let mut train_total = 0.0;
    let mut validation_total = 0.0;
    for metrics in record.epoch_data.values_mut() {
        if let Some(time) = metrics.get("time").and_then(Value::as_f64) {
            train_total += time;
            metrics.insert("time_sum".to_string(), float_value(train_total));
        }
        if let Some(time) = metrics.get("validation_time").and_then(Value::as_f64) {
            validation_total += time;
            metrics.insert("validation_time_sum".to_string(), float_value(validation_total));
        }
        if let Some(accuracy) = metrics.remove(VALIDATION_ACCURACY_TYPO) {
            metrics.insert("val_acc1".to_string(), accuracy);
        }
    }
}

/// Rescale an accuracy series logged in percent to a fraction
///
/// Applied per run: if any epoch's value exceeds 1, every epoch's value of
/// that field is divided by 100.
pub fn normalize_accuracy(record: &mut RunRecord, key: &str) {
    let max = record
        .epoch_data
        .values()
        .filter_map(|metrics| metrics.get(key).and_then(Value::as_f64))
        .fold(0.0_f64, f64::max);
    if max <= 1.0 {
        return;
    }
    for metrics in record.epoch_data.values_mut() {
        if let Some(value) = metrics.get_mut(key) {
            if let Some(number) = value.as_f64() {
                *value = float_value(number / 100.0);
            }
        }
    }
}

/// Copy the last epoch's metrics to `final_*` fields and set `final_epoch`
pub fn extract_final_epoch(record: &mut RunRecord) {
    let Some((&last, metrics)) = record.epoch_data.iter().next_back() else {
        return;
    };
    let finals: FieldMap = metrics
        .iter()
        .map(|(key, value)| (format!("final_{}", key), value.clone()))
        .collect();
    record.absorb(finals, Precedence::Incoming);
    record.final_epoch = Some(last);
}

/// Replace a nested `throughput` object with `throughput_*` fields
pub fn flatten_throughput(record: &mut RunRecord) {
    let Some(throughput) = record.extra.remove("throughput") else {
        return;
    };
    let entries = match throughput {
        Value::Object(entries) => entries,
        other => {
            debug!(run = ?record.run_name, "throughput is not a mapping, kept as is");
            record.extra.insert("throughput".to_string(), other);
            return;
        }
    };
    let flattened: FieldMap = entries
        .into_iter()
        .map(|(key, value)| (format!("throughput_{}", key), value))
        .collect();
    record.absorb(flattened, Precedence::Incoming);
}

/// `top_*` = best value over all epochs of every accuracy-like field
///
/// Candidate fields are those present in the first or the last epoch.
pub fn extract_best_accuracies(record: &mut RunRecord) {
    let (Some(first), Some(last)) = (
        record.epoch_data.values().next(),
        record.epoch_data.values().next_back(),
    ) else {
        return;
    };
    let mut keys: Vec<&String> = first.keys().chain(last.keys()).collect();
    keys.sort();
    keys.dedup();

    let best: FieldMap = keys
        .into_iter()
        .filter(|key| key.contains("acc"))
        .map(|key| {
            let top = record
                .epoch_data
                .values()
                .filter_map(|metrics| metrics.get(key).and_then(Value::as_f64))
                .fold(0.0_f64, f64::max);
            (format!("top_{}", key), float_value(top))
        })
        .collect();
    record.absorb(best, Precedence::Incoming);
}

/// Turn per-device batch sizes into global ones for both phases
///
/// The original per-device value is kept as `local_batch_size`.
pub fn expand_batch_sizes(record: &mut RunRecord) {
    if let (Some(world_size), Some(batch_size)) = (record.world_size, record.batch_size) {
        record.local_batch_size = Some(batch_size);
        record.batch_size = Some(batch_size.saturating_mul(world_size));
    }

    let world_key = format!("{}_world_size", PRETRAIN_PREFIX);
    let batch_key = format!("{}_batch_size", PRETRAIN_PREFIX);
    let world_size = record.extra.get(&world_key).and_then(as_integer);
    let batch_size = record.extra.get(&batch_key).and_then(as_integer);
    if let (Some(world_size), Some(batch_size)) = (world_size, batch_size) {
        record.extra.insert(
            format!("{}_local_batch_size", PRETRAIN_PREFIX),
            Value::from(batch_size),
        );
        record.extra.insert(batch_key, Value::from(batch_size.saturating_mul(world_size)));
    }
}

fn multiply(value: &Value, factor: i64) -> Option<Value> {
    if let Some(product) = value.as_i64().and_then(|int| int.checked_mul(factor)) {
        return Some(Value::from(product));
    }
    value.as_f64().map(|number| float_value(number * factor as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_epochs(world_size: Option<i64>, epochs: &[(u32, Value)]) -> RunRecord {
        let mut record = RunRecord::new();
        record.run_name = Some("run".to_string());
        record.world_size = world_size;
        for (epoch, metrics) in epochs {
            let metrics: FieldMap = serde_json::from_value(metrics.clone()).unwrap();
            record.epoch_data.insert(*epoch, metrics);
        }
        record
    }

    fn series(record: &RunRecord, key: &str) -> Vec<f64> {
        record
            .epoch_data
            .values()
            .filter_map(|m| m.get(key).and_then(Value::as_f64))
            .collect()
    }

    #[test]
    fn test_time_scaled_by_world_size() {
        let mut record = with_epochs(Some(4), &[(0, json!({"time": 120.0, "loss": 2.0}))]);
        scale_device_time(&mut record);

        assert_eq!(record.epoch_data[&0]["time"].as_f64(), Some(480.0));
        assert_eq!(record.epoch_data[&0]["loss"].as_f64(), Some(2.0));
    }

    #[test]
    fn test_time_left_alone_without_world_size() {
        let mut record = with_epochs(None, &[(0, json!({"time": 120.0}))]);
        scale_device_time(&mut record);

        assert_eq!(record.epoch_data[&0]["time"].as_f64(), Some(120.0));
    }

    #[test]
    fn test_cumulative_sums_use_scaled_times() {
        for world_size in [1, 3, 8] {
            let mut record = with_epochs(
                Some(world_size),
                &[
                    (0, json!({"time": 10.0})),
                    (1, json!({"time": 20.0})),
                    (2, json!({"time": 30.0})),
                ],
            );
            scale_device_time(&mut record);
            accumulate_times(&mut record);

            let w = world_size as f64;
            assert_eq!(series(&record, "time_sum"), vec![10.0 * w, 30.0 * w, 60.0 * w]);
        }
    }

    #[test]
    fn test_validation_time_sum_and_typo_fix() {
        let mut record = with_epochs(
            None,
            &[
                (0, json!({"validation_time": 5.0, "validataion_accuracy": 0.5})),
                (1, json!({"validation_time": 7.0})),
            ],
        );
        accumulate_times(&mut record);

        assert_eq!(series(&record, "validation_time_sum"), vec![5.0, 12.0]);
        assert_eq!(record.epoch_data[&0]["val_acc1"], json!(0.5));
        assert!(!record.epoch_data[&0].contains_key("validataion_accuracy"));
    }

    #[test]
    fn test_accuracy_in_percent_is_rescaled() {
        let mut record = with_epochs(
            None,
            &[
                (0, json!({"acc1": 45.0})),
                (1, json!({"acc1": 67.0})),
                (2, json!({"acc1": 92.0})),
            ],
        );
        normalize_accuracy(&mut record, "acc1");

        assert_eq!(series(&record, "acc1"), vec![0.45, 0.67, 0.92]);
    }

    #[test]
    fn test_fractional_accuracy_is_unchanged() {
        let mut record = with_epochs(
            None,
            &[(0, json!({"acc1": 0.45})), (1, json!({"acc1": 0.67}))],
        );
        normalize_accuracy(&mut record, "acc1");

        assert_eq!(series(&record, "acc1"), vec![0.45, 0.67]);
    }

    #[test]
    fn test_training_and_validation_accuracy_corrected_independently() {
        let mut record = with_epochs(None, &[(0, json!({"acc1": 0.8, "val_acc1": 75.0}))]);
        normalize_accuracy(&mut record, "acc1");
        normalize_accuracy(&mut record, "val_acc1");

        assert_eq!(series(&record, "acc1"), vec![0.8]);
        assert_eq!(series(&record, "val_acc1"), vec![0.75]);
    }

    #[test]
    fn test_final_epoch_fields() {
        let mut record = with_epochs(
            None,
            &[(0, json!({"loss": 3.0})), (9, json!({"loss": 1.0, "time_sum": 99.0}))],
        );
        extract_final_epoch(&mut record);

        assert_eq!(record.final_epoch, Some(9));
        assert_eq!(record.extra["final_loss"], json!(1.0));
        assert_eq!(record.extra["final_time_sum"], json!(99.0));
    }

    #[test]
    fn test_throughput_is_flattened() {
        let mut record = with_epochs(None, &[]);
        record.extra.insert("throughput".to_string(), json!({"value": 1500.5, "batch_size": 256}));
        flatten_throughput(&mut record);

        assert!(!record.extra.contains_key("throughput"));
        assert_eq!(record.extra["throughput_value"], json!(1500.5));
        assert_eq!(record.extra["throughput_batch_size"], json!(256));
    }

    #[test]
    fn test_best_accuracies() {
        let mut record = with_epochs(
            None,
            &[
                (0, json!({"acc1": 0.2, "val_acc5": 0.5, "loss": 4.0})),
                (1, json!({"acc1": 0.7})),
                (2, json!({"acc1": 0.6, "val_acc1": 0.55})),
            ],
        );
        extract_best_accuracies(&mut record);

        assert_eq!(record.extra["top_acc1"], json!(0.7));
        assert_eq!(record.extra["top_val_acc5"], json!(0.5));
        assert_eq!(record.extra["top_val_acc1"], json!(0.55));
        assert!(!record.extra.contains_key("top_loss"));
    }

    #[test]
    fn test_batch_expansion_for_both_phases() {
        let mut record = with_epochs(Some(8), &[]);
        record.batch_size = Some(32);
        record.extra.insert("pre-train_world_size".to_string(), json!(4));
        record.extra.insert("pre-train_batch_size".to_string(), json!(128));
        expand_batch_sizes(&mut record);

        assert_eq!(record.local_batch_size, Some(32));
        assert_eq!(record.batch_size, Some(256));
        assert_eq!(record.extra["pre-train_local_batch_size"], json!(128));
        assert_eq!(record.extra["pre-train_batch_size"], json!(512));
    }

    #[test]
    fn test_batch_left_alone_without_world_size() {
        let mut record = with_epochs(None, &[]);
        record.batch_size = Some(32);
        expand_batch_sizes(&mut record);

        assert_eq!(record.batch_size, Some(32));
        assert_eq!(record.local_batch_size, None);
    }
}
