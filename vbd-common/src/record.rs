//! Run record data model
//!
//! A [`RunRecord`] is everything scraped from one training log. The handful
//! of fields the pipeline itself reasons about are typed; every other
//! argument or metric lands in the residual `extra` map so new argument
//! names flow through without code changes.
//!
//! On the wire a record is one flat JSON object. `epoch_data` is always
//! present, keyed by the epoch number rendered as a string.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::merge::{merge, Precedence};

/// Field name → value map used for argument dumps and residual fields
pub type FieldMap = BTreeMap<String, Value>;

/// Metrics recorded for a single epoch
pub type EpochMetrics = BTreeMap<String, Value>;

/// Format of `run_date` (day.month.year hour:minute:second)
pub const RUN_DATE_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

pub const RUN_NAME: &str = "run_name";
pub const RUN_DATE: &str = "run_date";
pub const MODEL: &str = "model";
pub const TASK: &str = "task";
pub const DEVICE: &str = "device";
pub const EXPERIMENT_ID: &str = "experiment_id";
pub const WORLD_SIZE: &str = "world_size";
pub const BATCH_SIZE: &str = "batch_size";
pub const LOCAL_BATCH_SIZE: &str = "local_batch_size";
pub const FINAL_EPOCH: &str = "final_epoch";
pub const EPOCH_DATA: &str = "epoch_data";

/// One training or evaluation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "FieldMap", into = "FieldMap")]
pub struct RunRecord {
    pub run_name: Option<String>,
    /// Combined `d.m.Y H:M:S` string taken from the run name line
    pub run_date: Option<String>,
    pub model: Option<String>,
    pub task: Option<String>,
    pub device: Option<String>,
    pub experiment_id: Option<i64>,
    /// Number of devices the finetuning phase ran on
    pub world_size: Option<i64>,
    pub batch_size: Option<i64>,
    pub local_batch_size: Option<i64>,
    pub final_epoch: Option<u32>,
    pub epoch_data: BTreeMap<u32, EpochMetrics>,
    /// Every field without a typed slot, including typed fields whose
    /// value had an unexpected type
    pub extra: FieldMap,
}

impl RunRecord {
    /// Empty record with no epochs
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the record carries a usable, non-empty run name
    pub fn has_run_name(&self) -> bool {
        self.run_name.as_deref().is_some_and(|name| !name.is_empty())
    }

    /// Parse `run_date` into a timestamp
    pub fn run_timestamp(&self) -> Option<NaiveDateTime> {
        let date = self.run_date.as_deref()?;
        NaiveDateTime::parse_from_str(date, RUN_DATE_FORMAT).ok()
    }

    /// Look up any field by name, typed or residual
    pub fn get(&self, key: &str) -> Option<Value> {
        let typed = match key {
            RUN_NAME => self.run_name.clone().map(Value::from),
            RUN_DATE => self.run_date.clone().map(Value::from),
            MODEL => self.model.clone().map(Value::from),
            TASK => self.task.clone().map(Value::from),
            DEVICE => self.device.clone().map(Value::from),
            EXPERIMENT_ID => self.experiment_id.map(Value::from),
            WORLD_SIZE => self.world_size.map(Value::from),
            BATCH_SIZE => self.batch_size.map(Value::from),
            LOCAL_BATCH_SIZE => self.local_batch_size.map(Value::from),
            FINAL_EPOCH => self.final_epoch.map(Value::from),
            EPOCH_DATA => Some(epochs_to_value(&self.epoch_data)),
            _ => None,
        };
        typed.or_else(|| self.extra.get(key).cloned())
    }

    /// True if `key` is present on the record
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a single field, routing it to its typed slot when it has one
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let mut fields = FieldMap::new();
        fields.insert(key.into(), value);
        self.absorb(fields, Precedence::Incoming);
    }

    /// Merge a field map into this record under an explicit precedence
    pub fn absorb(&mut self, incoming: FieldMap, precedence: Precedence) {
        let current = std::mem::take(self).into_fields();
        *self = Self::from_fields(merge(current, incoming, precedence));
    }

    /// Flatten into a single field map (the on-disk shape)
    pub fn into_fields(self) -> FieldMap {
        let mut fields = self.extra;
        put(&mut fields, RUN_NAME, self.run_name);
        put(&mut fields, RUN_DATE, self.run_date);
        put(&mut fields, MODEL, self.model);
        put(&mut fields, TASK, self.task);
        put(&mut fields, DEVICE, self.device);
        put(&mut fields, EXPERIMENT_ID, self.experiment_id);
        put(&mut fields, WORLD_SIZE, self.world_size);
        put(&mut fields, BATCH_SIZE, self.batch_size);
        put(&mut fields, LOCAL_BATCH_SIZE, self.local_batch_size);
        put(&mut fields, FINAL_EPOCH, self.final_epoch);
        fields.insert(EPOCH_DATA.to_string(), epochs_to_value(&self.epoch_data));
        fields
    }

    /// Build a record from a flat field map
    ///
    /// A typed field whose value has the wrong type stays in `extra`
    /// under its original name.
    pub fn from_fields(mut fields: FieldMap) -> Self {
        let mut record = RunRecord {
            run_name: take_string(&mut fields, RUN_NAME),
            run_date: take_string(&mut fields, RUN_DATE),
            model: take_string(&mut fields, MODEL),
            task: take_string(&mut fields, TASK),
            device: take_string(&mut fields, DEVICE),
            experiment_id: take_integer(&mut fields, EXPERIMENT_ID),
            world_size: take_integer(&mut fields, WORLD_SIZE),
            batch_size: take_integer(&mut fields, BATCH_SIZE),
            local_batch_size: take_integer(&mut fields, LOCAL_BATCH_SIZE),
            final_epoch: take_integer(&mut fields, FINAL_EPOCH)
                .and_then(|epoch| u32::try_from(epoch).ok()),
            epoch_data: BTreeMap::new(),
            extra: FieldMap::new(),
        };

        if let Some(value) = fields.remove(EPOCH_DATA) {
            match epochs_from_value(value) {
                Ok(epochs) => record.epoch_data = epochs,
                Err(value) => {
                    fields.insert(EPOCH_DATA.to_string(), value);
                }
            }
        }

        record.extra = fields;
        record
    }
}

impl From<FieldMap> for RunRecord {
    fn from(fields: FieldMap) -> Self {
        RunRecord::from_fields(fields)
    }
}

impl From<RunRecord> for FieldMap {
    fn from(record: RunRecord) -> Self {
        record.into_fields()
    }
}

/// Interpret a JSON value as an integer, accepting integral floats
pub fn as_integer(value: &Value) -> Option<i64> {
    if let Some(int) = value.as_i64() {
        return Some(int);
    }
    let float = value.as_f64()?;
    if float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
        Some(float as i64)
    } else {
        None
    }
}

fn put<T: Into<Value>>(fields: &mut FieldMap, key: &str, value: Option<T>) {
    if let Some(value) = value {
        fields.insert(key.to_string(), value.into());
    }
}

fn take_string(fields: &mut FieldMap, key: &str) -> Option<String> {
    match fields.remove(key)? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => {
            debug!(field = key, value = %other, "Non-string value kept as residual field");
            fields.insert(key.to_string(), other);
            None
        }
    }
}

fn take_integer(fields: &mut FieldMap, key: &str) -> Option<i64> {
    let value = fields.remove(key)?;
    if value.is_null() {
        return None;
    }
    match as_integer(&value) {
        Some(int) => Some(int),
        None => {
            debug!(field = key, value = %value, "Non-integer value kept as residual field");
            fields.insert(key.to_string(), value);
            None
        }
    }
}

fn epochs_to_value(epochs: &BTreeMap<u32, EpochMetrics>) -> Value {
    Value::Object(
        epochs
            .iter()
            .map(|(epoch, metrics)| {
                let metrics = metrics
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<serde_json::Map<_, _>>();
                (epoch.to_string(), Value::Object(metrics))
            })
            .collect(),
    )
}

fn epochs_from_value(value: Value) -> std::result::Result<BTreeMap<u32, EpochMetrics>, Value> {
    let Value::Object(map) = value else {
        return Err(value);
    };
    let valid = map
        .iter()
        .all(|(epoch, metrics)| epoch.parse::<u32>().is_ok() && metrics.is_object());
    if !valid {
        return Err(Value::Object(map));
    }

    let mut epochs = BTreeMap::new();
    for (epoch, metrics) in map {
        if let (Ok(epoch), Value::Object(metrics)) = (epoch.parse::<u32>(), metrics) {
            epochs.insert(epoch, metrics.into_iter().collect());
        }
    }
    Ok(epochs)
}
