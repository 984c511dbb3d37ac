//! In-memory copy of the published snapshot
//!
//! Handlers only ever read the cached corpus. A poll task reloads it from
//! disk on its own timer; a failed reload keeps the previous corpus.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vbd_common::{snapshot, Error, Result, RunRecord};

#[derive(Debug, Default)]
struct Cached {
    corpus: Arc<Vec<RunRecord>>,
    loaded_at: Option<DateTime<Utc>>,
}

/// Shared snapshot cache
#[derive(Debug)]
pub struct SnapshotCache {
    path: PathBuf,
    inner: RwLock<Cached>,
}

impl SnapshotCache {
    /// Empty cache for the snapshot at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: RwLock::new(Cached::default()),
        }
    }

    /// Cache pre-filled with `corpus`
    pub fn with_corpus(path: impl Into<PathBuf>, corpus: Vec<RunRecord>) -> Self {
        Self {
            path: path.into(),
            inner: RwLock::new(Cached {
                corpus: Arc::new(corpus),
                loaded_at: Some(Utc::now()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current corpus
    ///
    /// `NotFound` until the first successful load.
    pub async fn corpus(&self) -> Result<Arc<Vec<RunRecord>>> {
        let inner = self.inner.read().await;
        match inner.loaded_at {
            Some(_) => Ok(Arc::clone(&inner.corpus)),
            None => Err(Error::NotFound(format!(
                "no snapshot loaded from {}",
                self.path.display()
            ))),
        }
    }

    pub async fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.loaded_at
    }

    /// Reload the snapshot from disk, returning the number of records
    pub async fn refresh(&self) -> Result<usize> {
        let corpus: Vec<RunRecord> = snapshot::load(&self.path).await?;
        let count = corpus.len();
        let mut inner = self.inner.write().await;
        inner.corpus = Arc::new(corpus);
        inner.loaded_at = Some(Utc::now());
        Ok(count)
    }

    /// Reload every `interval` until the task is dropped or aborted
    pub fn spawn_poller(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.refresh().await {
                    Ok(records) => debug!(records, "Snapshot reloaded"),
                    Err(Error::NotFound(_)) => {
                        info!("No snapshot at {} yet", self.path.display());
                    }
                    Err(e) => warn!("Snapshot reload failed, keeping previous corpus: {}", e),
                }
            }
        })
    }
}
