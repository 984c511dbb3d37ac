//! Column/metric projection
//!
//! Reshapes the run corpus into the dashboard table: user-facing column
//! names, display units, taxonomy class and canonical model name, plus the
//! per-epoch series reduced to a curated subset and packed into one JSON
//! text cell.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vbd_common::taxonomy::UNCLASSIFIED;
use vbd_common::{EpochMetrics, RunRecord, TaxonomyResolver};

/// One projected table row, keyed by column name
pub type Row = Map<String, Value>;

pub const RUN_NAME_COLUMN: &str = "run name";
pub const RUN_DATE_COLUMN: &str = "run date";
pub const MODEL_COLUMN: &str = "model";
pub const TAXONOMY_CLASS_COLUMN: &str = "taxonomy class";
pub const EPOCH_DATA_COLUMN: &str = "epoch_data";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const HOUR: f64 = 3600.0;

/// Column name → record field
pub const COLUMNS: &[(&str, &str)] = &[
    // info
    ("run name", "run_name"),
    ("run date", "run_date"),
    ("model", "model"),
    ("GPU type (finetuning)", "device"),
    // hyperparameters
    ("epochs (pretraining)", "pre-train_epochs"),
    ("image resolution (pretraining) [px]", "pre-train_imsize"),
    ("GPUS (pretraining)", "pre-train_world_size"),
    ("lr (pretraining)", "pre-train_lr"),
    ("per-GPU batch size (pretraining) [ims]", "pre-train_local_batch_size"),
    ("dataloader workers (pretraining)", "pre-train_num_workers"),
    ("batch size (pretraining) [ims]", "pre-train_batch_size"),
    ("dataset (pretraining)", "pre-train_dataset"),
    ("image resolution (finetuning) [px]", "imsize"),
    ("epochs (finetuning)", "final_epoch"),
    ("GPUs (finetuning)", "world_size"),
    ("per-GPU batch size (finetuning) [ims]", "local_batch_size"),
    ("lr (finetuning)", "lr"),
    ("dataloader workers (finetuning)", "num_workers"),
    ("dataset (finetuning)", "dataset"),
    ("batch size (finetuning) [ims]", "batch_size"),
    ("pre-norm", "pre_norm"),
    ("shuffle", "shuffle"),
    ("layer scale init", "pre-train_layer_scale_init_values"),
    ("gaussian blur (augmentation)", "aug_gauss_blur"),
    ("amp (for evaluation)", "eval_amp"),
    ("dropout", "dropout"),
    ("color jitter factor (augmentation)", "aug_color_jitter_factor"),
    ("resizing (augmentation)", "aug_resize"),
    ("pin_memory", "pin_memory"),
    ("warmup schedule", "warmup_sched"),
    ("warmup epochs", "warmup_epochs"),
    ("augmentation strategy", "augment_strategy"),
    ("normalization (augmentation)", "aug_normalize"),
    ("label smoothing (augmentation)", "label_smoothing"),
    ("gradient norm clip (max)", "max_grad_norm"),
    ("cutmix (augmentation)", "aug_cutmix"),
    ("qkv bias", "pre-train_qkv_bias"),
    ("lr schedule", "sched"),
    ("optimizer", "opt"),
    ("solarization (augmentation)", "aug_solarize"),
    ("layer scale", "pre-train_layer_scale"),
    ("amp (for training)", "amp"),
    ("drop path rate", "drop_path_rate"),
    ("weight decay", "weight_decay"),
    ("grayscale (augmentation)", "aug_grayscale"),
    ("crop (augmentation)", "aug_crop"),
    ("min lr", "min_lr"),
    ("flip (augmentation)", "aug_flip"),
    ("prefetch factor", "pre-train_prefetch_factor"),
    ("warmup lr", "pre-train_warmup_lr"),
    ("optimizer eps", "pre-train_opt_eps"),
    // metrics
    ("inference VRAM @32 [GB]", "inference_memory_@32"),
    ("inference VRAM @128 [GB]", "inference_memory_@128"),
    ("inference VRAM @1 [GB]", "inference_memory_@1"),
    ("inference VRAM @64 [GB]", "inference_memory_@64"),
    ("total finetuning time [h*GPUs]", "final_time_sum"),
    ("total validation time [h*GPUs]", "final_validation_time_sum"),
    ("throughput [ims/s]", "throughput_value"),
    ("throughput batch size [ims]", "throughput_batch_size"),
    ("training VRAM [GB]", "peak_memory_total"),
    ("training VRAM (single GPU) [GB]", "peak_memory_single"),
    ("number of parameters [Millions]", "number of parameters"),
    ("GFLOPs", "flops"),
    ("validation loss", "final_validation_loss"),
    ("training loss", "final_loss"),
    ("top-5 validation accuracy", "top_val_acc5"),
    ("top-5 training accuracy", "top_acc5"),
    ("top-1 validation accuracy", "top_val_acc1"),
    ("top-1 training accuracy", "top_acc1"),
];

/// Per-epoch series name → epoch metric key
pub const PER_EPOCH_METRICS: &[(&str, &str)] = &[
    ("gradient norm (max)", "grad norm max"),
    ("gradient norm (infinities)", "inf grad norm"),
    ("gradient norm (80-th percentile)", "grad norm 80%"),
    ("gradient norm (mean)", "grad norm avrg"),
    ("gradient norm (20-th percentile)", "grad norm 20%"),
    ("learning rate", "learning rate"),
    ("training time per epoch [h*GPUs]", "time"),
    ("validation time per epoch [h*GPUs]", "validation_time"),
    ("training time (total) [h*GPUs]", "time_sum"),
    ("validation time (total) [h*GPUs]", "validation_time_sum"),
    ("validation loss", "validation_loss"),
    ("training loss", "loss"),
    ("top-5 validation accuracy", "val_acc5"),
    ("top-5 training accuracy", "acc5"),
    ("top-1 training accuracy", "acc1"),
    ("top-1 validation accuracy", "val_acc1"),
];

/// Display divisor per column (bytes → GB, seconds → hours, counts → M/G)
const CONVERSION_FACTORS: &[(&str, f64)] = &[
    ("inference VRAM @1 [GB]", GIB),
    ("inference VRAM @32 [GB]", GIB),
    ("inference VRAM @64 [GB]", GIB),
    ("inference VRAM @128 [GB]", GIB),
    ("total finetuning time [h*GPUs]", HOUR),
    ("total validation time [h*GPUs]", HOUR),
    ("training VRAM [GB]", GIB),
    ("training VRAM (single GPU) [GB]", GIB),
    ("number of parameters [Millions]", 1e6),
    ("GFLOPs", 1e9),
    ("training time per epoch [h*GPUs]", HOUR),
    ("validation time per epoch [h*GPUs]", HOUR),
    ("training time (total) [h*GPUs]", HOUR),
    ("validation time (total) [h*GPUs]", HOUR),
];

/// Columns shown first, in this order
pub const PRIORITY_COLUMNS: &[&str] = &[
    "run name",
    "model",
    "taxonomy class",
    "top-1 validation accuracy",
    "number of parameters [Millions]",
    "GFLOPs",
    "throughput [ims/s]",
    "throughput batch size [ims]",
    "training VRAM [GB]",
    "training VRAM (single GPU) [GB]",
    "inference VRAM @1 [GB]",
    "inference VRAM @32 [GB]",
    "inference VRAM @64 [GB]",
    "inference VRAM @128 [GB]",
    "total finetuning time [h*GPUs]",
    "total validation time [h*GPUs]",
    "validation loss",
    "training loss",
    "top-5 validation accuracy",
    "top-1 training accuracy",
    "top-5 training accuracy",
];

/// Columns offered as scatter plot axes
const POINT_METRICS: &[&str] = &[
    "image resolution (pretraining) [px]",
    "GPUS (pretraining)",
    "lr (pretraining)",
    "image resolution (finetuning) [px]",
    "GPUs (finetuning)",
    "lr (finetuning)",
    "inference VRAM @32 [GB]",
    "inference VRAM @128 [GB]",
    "inference VRAM @1 [GB]",
    "inference VRAM @64 [GB]",
    "total finetuning time [h*GPUs]",
    "total validation time [h*GPUs]",
    "throughput [ims/s]",
    "throughput batch size [ims]",
    "training VRAM [GB]",
    "training VRAM (single GPU) [GB]",
    "number of parameters [Millions]",
    "GFLOPs",
    "validation loss",
    "training loss",
    "top-5 validation accuracy",
    "top-5 training accuracy",
    "top-1 validation accuracy",
    "top-1 training accuracy",
];

/// Table view switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ViewOptions {
    /// Newest runs first, with `run date` as the second column
    #[serde(default)]
    pub order_by_date: bool,
    #[serde(default)]
    pub include_run_name: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tooltip {
    pub value: String,
    pub use_with: String,
}

/// Rows, column schema and header tooltips for the table view
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub rows: Vec<Row>,
    pub columns: Vec<ColumnInfo>,
    pub tooltips: BTreeMap<String, Tooltip>,
}

/// Display divisor for a column or per-epoch series
pub fn conversion_factor(column: &str) -> Option<f64> {
    CONVERSION_FACTORS
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, factor)| *factor)
}

/// Scatter plot axis candidates, sorted
pub fn point_metrics() -> Vec<&'static str> {
    let mut metrics = POINT_METRICS.to_vec();
    metrics.sort_unstable();
    metrics
}

/// Names of the per-epoch series carried in the epoch blob
pub fn per_epoch_metric_names() -> Vec<&'static str> {
    PER_EPOCH_METRICS.iter().map(|(name, _)| *name).collect()
}

/// Table column order
///
/// Priority columns first, then the finetuning, augmentation, remaining
/// and pretraining groups (each alphabetical), then the epoch blob.
pub fn column_order(options: ViewOptions) -> Vec<String> {
    let mut first: Vec<&str> = PRIORITY_COLUMNS.to_vec();
    if options.order_by_date {
        first.insert(1, RUN_DATE_COLUMN);
    }

    let mut finetuning = BTreeSet::new();
    let mut augmentation = BTreeSet::new();
    let mut pretraining = BTreeSet::new();
    let mut rest = BTreeSet::new();
    for (column, _) in COLUMNS {
        if first.contains(column) {
            continue;
        }
        if column.contains("(finetuning)") {
            finetuning.insert(*column);
        } else if column.contains("(pretraining)") {
            pretraining.insert(*column);
        } else if column.contains("(augmentation)") {
            augmentation.insert(*column);
        } else {
            rest.insert(*column);
        }
    }

    first
        .into_iter()
        .chain(finetuning)
        .chain(augmentation)
        .chain(rest)
        .chain(pretraining)
        .chain(std::iter::once(EPOCH_DATA_COLUMN))
        .filter(|column| options.include_run_name || *column != RUN_NAME_COLUMN)
        .map(str::to_string)
        .collect()
}

/// Project a corpus into the table view
///
/// Records without a model or run date are left out.
pub fn project(
    corpus: &[RunRecord],
    resolver: &TaxonomyResolver,
    options: ViewOptions,
) -> TableInfo {
    let mut keyed: Vec<(SortKey, Row)> = corpus
        .iter()
        .filter_map(|record| project_record(record, resolver))
        .collect();
    if options.order_by_date {
        keyed.sort_by(|(a, _), (b, _)| a.by_date(b));
    } else {
        keyed.sort_by(|(a, _), (b, _)| a.by_class(b));
    }

    let names = column_order(options);
    let columns = names
        .iter()
        .filter(|name| name.as_str() != EPOCH_DATA_COLUMN)
        .map(|name| ColumnInfo {
            name: name.clone(),
            id: name.clone(),
        })
        .collect();
    let tooltips = names
        .iter()
        .map(|name| {
            let tooltip = Tooltip {
                value: name.clone(),
                use_with: "header".to_string(),
            };
            (name.clone(), tooltip)
        })
        .collect();

    TableInfo {
        rows: keyed.into_iter().map(|(_, row)| row).collect(),
        columns,
        tooltips,
    }
}

/// Ordering data computed alongside each row
#[derive(Debug, Clone)]
struct SortKey {
    category: Option<usize>,
    model: String,
    run_date: Option<NaiveDateTime>,
}

impl SortKey {
    /// Taxonomy declaration order, unclassified last, then model name
    fn by_class(&self, other: &Self) -> Ordering {
        let class = |key: &Self| key.category.unwrap_or(usize::MAX);
        class(self)
            .cmp(&class(other))
            .then_with(|| self.model.cmp(&other.model))
    }

    /// Newest first; undated rows last
    fn by_date(&self, other: &Self) -> Ordering {
        match (self.run_date, other.run_date) {
            (Some(a), Some(b)) => Reverse(a).cmp(&Reverse(b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

fn project_record(record: &RunRecord, resolver: &TaxonomyResolver) -> Option<(SortKey, Row)> {
    let model = record.model.as_deref()?;
    let run_date = record.run_date.as_deref()?;

    let mut row = Row::new();
    for (column, field) in COLUMNS {
        let value = record.get(field).map_or(Value::Null, |value| convert(column, value));
        row.insert(column.to_string(), value);
    }

    let timestamp = record.run_timestamp();
    let date_cell = match timestamp {
        Some(ts) => ts.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => run_date.to_string(),
    };
    row.insert(RUN_DATE_COLUMN.to_string(), Value::String(date_cell));

    let category = resolver.classify(model);
    let class_name = category.map_or(UNCLASSIFIED, |c| c.name.as_str());
    let category_index = category.and_then(|c| resolver.taxonomy().category_index(&c.name));
    let canonical = resolver.canonical_name(model);
    row.insert(TAXONOMY_CLASS_COLUMN.to_string(), Value::from(class_name));
    row.insert(MODEL_COLUMN.to_string(), Value::from(canonical.clone()));
    row.insert(
        EPOCH_DATA_COLUMN.to_string(),
        Value::String(epoch_blob(&record.epoch_data)),
    );

    let key = SortKey {
        category: category_index,
        model: canonical,
        run_date: timestamp,
    };
    Some((key, row))
}

/// Curated per-epoch series as JSON text: `{epoch: {series: value}}`
pub fn epoch_blob(epochs: &BTreeMap<u32, EpochMetrics>) -> String {
    let blob: Map<String, Value> = epochs
        .iter()
        .map(|(epoch, metrics)| {
            let series: Map<String, Value> = PER_EPOCH_METRICS
                .iter()
                .filter_map(|(name, key)| {
                    metrics.get(*key).map(|value| (name.to_string(), convert(name, value.clone())))
                })
                .collect();
            (epoch.to_string(), Value::Object(series))
        })
        .collect();
    Value::Object(blob).to_string()
}

/// Apply a column's display divisor to a numeric value
fn convert(column: &str, value: Value) -> Value {
    match (conversion_factor(column), value.as_f64()) {
        (Some(factor), Some(number)) => serde_json::Number::from_f64(number / factor)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        _ => value,
    }
}
