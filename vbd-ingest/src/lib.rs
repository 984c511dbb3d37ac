//! vbd-ingest library interface
//!
//! Turns a directory of training logs into a published run corpus:
//! - [`extractor`]: one log file → one [`vbd_common::RunRecord`]
//! - [`scanner`]: discovery of log files in the log directory
//! - [`corpus`]: parallel extraction, filtering and atomic publishing

pub mod corpus;
pub mod error;
pub mod extractor;
pub mod scanner;

pub use corpus::{CorpusBuilder, CycleReport};
pub use error::{CorpusError, ExtractError, ScanError};
pub use extractor::{extract_file, extract_str};
pub use scanner::LogScanner;
