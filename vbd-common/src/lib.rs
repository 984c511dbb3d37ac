//! # VBD Common Library
//!
//! Shared code for the benchmark dashboard services including:
//! - Run record data model and explicit merge functions
//! - Model taxonomy reference data and resolver
//! - Snapshot publishing and loading
//! - Configuration loading
//! - Error types

pub mod config;
pub mod error;
pub mod merge;
pub mod record;
pub mod snapshot;
pub mod taxonomy;

pub use error::{Error, Result};
pub use merge::{merge, Precedence};
pub use record::{EpochMetrics, FieldMap, RunRecord};
pub use taxonomy::{ModelDisplayInfo, Taxonomy, TaxonomyResolver};
