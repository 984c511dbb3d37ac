//! Error types for vbd-ingest

use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn one log file into a record
///
/// Any of these discards that file's record only; the rest of the corpus
/// is unaffected.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Log file could not be read
    #[error("IO error reading {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    /// Run line carried a date but no parsable run name (corrupt log)
    #[error("Run name not found in line {line:?}")]
    MissingRunName { line: String },

    /// Extraction panicked inside a worker
    #[error("Extraction of {0} panicked: {1}")]
    Panicked(PathBuf, String),
}

/// Log directory scanning errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// General I/O error
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Failure of a whole build cycle; the previous snapshot stays in place
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Scan failed: {0}")]
    Scan(#[from] ScanError),

    /// Worker pool could not be created
    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error("Publish failed: {0}")]
    Publish(#[from] vbd_common::Error),
}
