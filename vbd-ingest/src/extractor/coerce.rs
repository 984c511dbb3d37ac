//! Value coercion for scraped log text

use serde_json::Value;
use vbd_common::FieldMap;

/// Turn a Python dict repr into JSON text
///
/// Only the token-level rewrites the training scripts need: single quotes,
/// `None`, and the `True`/`False` literals (which always follow a space).
pub fn normalize_python_literal(literal: &str) -> String {
    normalize_quotes(literal)
        .replace("None", "null")
        .replace(" False", " false")
        .replace(" True", " true")
}

/// Single quotes to double quotes
pub fn normalize_quotes(literal: &str) -> String {
    literal.replace('\'', "\"")
}

/// Parse a normalized literal that must be a mapping
pub fn parse_mapping(json: &str) -> Result<FieldMap, serde_json::Error> {
    serde_json::from_str(json)
}

/// JSON number for a float; non-finite values become null
pub fn float_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Coerce a per-epoch metric value
///
/// Plain numbers parse as floats. Otherwise a trailing `s` is a seconds
/// unit, a trailing `%` is a percentage (scaled to a fraction), and a
/// bracketed list with one element is unwrapped. Anything else stays text.
pub fn coerce_epoch_value(raw: &str) -> Value {
    let text = raw.trim();
    if let Ok(number) = text.parse::<f64>() {
        return float_value(number);
    }
    if let Some(seconds) = text.strip_suffix('s') {
        if let Ok(number) = seconds.trim().parse::<f64>() {
            return float_value(number);
        }
    } else if let Some(percent) = text.strip_suffix('%') {
        if let Ok(number) = percent.trim().parse::<f64>() {
            return float_value(number / 100.0);
        }
    } else if text.starts_with('[') && text.ends_with(']') {
        if let Ok(list) = serde_json::from_str::<Value>(text) {
            return match list {
                Value::Array(mut items) if items.len() == 1 => items.remove(0),
                other => other,
            };
        }
    }
    Value::String(raw.to_string())
}

/// Coerce an efficiency metric value: integer, then float, then text
pub fn coerce_efficiency_value(raw: &str) -> Value {
    let text = raw.trim();
    if let Ok(int) = text.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(number) = text.parse::<f64>() {
        return float_value(number);
    }
    Value::String(raw.to_string())
}
