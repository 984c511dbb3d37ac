//! Snapshot publishing and loading
//!
//! The snapshot is the single shared artifact between the corpus builder
//! and its readers. It is only ever replaced whole: the corpus is written to
//! a sibling temp file, synced, then renamed over the well-known path.
//! Writing in place is never allowed.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Delay before the single re-read of a snapshot that failed to parse
pub const READ_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Temp file used while publishing `path`
///
/// Lives next to the target so the final rename stays on one filesystem.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("snapshot");
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts))
}

/// Atomically replace `path` with `bytes`
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_path_for(path);
    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Serialize `items` as a JSON array and atomically publish it at `path`
pub fn publish<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let bytes = serde_json::to_vec(items)?;
    atomic_write_bytes(path, &bytes)?;
    debug!(path = %path.display(), items = items.len(), bytes = bytes.len(), "Snapshot published");
    Ok(())
}

/// Load a published snapshot
///
/// A snapshot that does not parse is read once more after
/// [`READ_RETRY_DELAY`] before the error is returned.
pub async fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    load_with_retry_delay(path, READ_RETRY_DELAY).await
}

/// [`load`] with an explicit retry delay
pub async fn load_with_retry_delay<T: DeserializeOwned>(
    path: &Path,
    retry_delay: Duration,
) -> Result<Vec<T>> {
    match read_once(path).await {
        Err(Error::Json(e)) => {
            warn!(
                path = %path.display(),
                "Snapshot unreadable ({}), retrying in {:?}",
                e,
                retry_delay
            );
            tokio::time::sleep(retry_delay).await;
            read_once(path).await
        }
        other => other,
    }
}

async fn read_once<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!("snapshot {}", path.display())));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&bytes)?)
}
