//! Log file discovery
//!
//! Only files with a `.log` extension directly inside the log directory are
//! considered; subdirectories are not descended into. Symlinks are followed,
//! so a linked log counts as a file of the directory.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ScanError;

/// Extension of training log files
pub const LOG_EXTENSION: &str = "log";

/// Log directory scanner
pub struct LogScanner {
    ignore_patterns: Vec<String>,
}

impl LogScanner {
    /// Create a scanner that skips editor and OS droppings
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![".DS_Store".to_string(), ".swp".to_string()],
        }
    }

    /// List the log files in `log_dir`, sorted by path
    ///
    /// Unreadable entries are logged and skipped. The sort keeps the
    /// published corpus order stable between cycles.
    pub fn scan(&self, log_dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !log_dir.exists() {
            return Err(ScanError::PathNotFound(log_dir.to_path_buf()));
        }

        if !log_dir.is_dir() {
            return Err(ScanError::NotADirectory(log_dir.to_path_buf()));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(log_dir)
            .follow_links(true)
            .min_depth(1)
            .max_depth(1);
        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.is_log_file(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                Err(e) if e.depth() == 0 => {
                    return Err(ScanError::IoError(e.to_string()));
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }
        files.sort();

        tracing::debug!(dir = %log_dir.display(), files = files.len(), "Log directory scanned");
        Ok(files)
    }

    fn is_log_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        if self.ignore_patterns.iter().any(|p| name.contains(p.as_str())) {
            return false;
        }
        path.extension().is_some_and(|ext| ext == LOG_EXTENSION)
    }
}

impl Default for LogScanner {
    fn default() -> Self {
        Self::new()
    }
}
