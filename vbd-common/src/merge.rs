//! Explicit, ordered field-map merging
//!
//! Every place that combines two field maps states which side wins on a
//! key conflict. Nothing relies on key iteration order.

use crate::record::FieldMap;

/// Which side of a merge keeps its value when both define a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precedence {
    /// Existing fields are kept; incoming fields only fill gaps
    Base,
    /// Incoming fields replace existing ones
    Incoming,
}

/// Merge `incoming` into `base` under the given precedence
pub fn merge(mut base: FieldMap, incoming: FieldMap, precedence: Precedence) -> FieldMap {
    for (key, value) in incoming {
        match precedence {
            Precedence::Incoming => {
                base.insert(key, value);
            }
            Precedence::Base => {
                base.entry(key).or_insert(value);
            }
        }
    }
    base
}

/// Rename every key to `{prefix}_{key}`
pub fn prefixed(fields: FieldMap, prefix: &str) -> FieldMap {
    fields
        .into_iter()
        .map(|(key, value)| (format!("{}_{}", prefix, key), value))
        .collect()
}
