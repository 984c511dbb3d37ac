//! Run corpus builder
//!
//! One cycle scans the log directory, extracts every log on a fixed-size
//! rayon pool, drops records without a usable run name and publishes the
//! survivors as the new snapshot. Workers share nothing; results are joined
//! once all files are done.
//!
//! [`CorpusBuilder::run`] repeats cycles forever. A failed cycle is logged
//! and leaves the previous snapshot untouched.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, info, warn};
use vbd_common::config::DashboardConfig;
use vbd_common::{snapshot, RunRecord};

use crate::error::{CorpusError, ExtractError};
use crate::extractor::extract_file;
use crate::scanner::LogScanner;

/// Outcome of one build cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Log files found
    pub files: usize,
    /// Records published
    pub records: usize,
    /// Records dropped for lacking a run name
    pub discarded: usize,
    /// Files whose extraction failed outright
    pub failures: usize,
    pub elapsed: Duration,
}

/// Periodic log → snapshot builder
pub struct CorpusBuilder {
    log_dir: PathBuf,
    snapshot_path: PathBuf,
    interval: Duration,
    scanner: LogScanner,
    pool: ThreadPool,
}

impl CorpusBuilder {
    /// Create a builder with a pool of exactly `workers` threads
    pub fn new(
        log_dir: impl Into<PathBuf>,
        snapshot_path: impl Into<PathBuf>,
        workers: usize,
        interval: Duration,
    ) -> Result<Self, CorpusError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("vbd-extract-{}", i))
            .build()
            .map_err(|e| CorpusError::Pool(e.to_string()))?;

        Ok(Self {
            log_dir: log_dir.into(),
            snapshot_path: snapshot_path.into(),
            interval,
            scanner: LogScanner::new(),
            pool,
        })
    }

    pub fn from_config(config: &DashboardConfig) -> Result<Self, CorpusError> {
        Self::new(
            &config.log_dir,
            &config.snapshot_path,
            config.workers,
            config.refresh_interval(),
        )
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single cycle and publish its corpus
    pub fn build_once(&self) -> Result<CycleReport, CorpusError> {
        self.build_with(extract_file)
    }

    /// [`build_once`](Self::build_once) with a custom per-file extractor
    pub fn build_with<F>(&self, extract: F) -> Result<CycleReport, CorpusError>
    where
        F: Fn(&Path) -> Result<RunRecord, ExtractError> + Sync,
    {
        let started = Instant::now();
        let files = self.scanner.scan(&self.log_dir)?;

        let results: Vec<Result<RunRecord, ExtractError>> = self.pool.install(|| {
            files
                .par_iter()
                .map(|path| extract_guarded(path, &extract))
                .collect()
        });

        let mut report = CycleReport {
            files: files.len(),
            ..Default::default()
        };
        let mut corpus = Vec::with_capacity(results.len());
        for (path, result) in files.iter().zip(results) {
            match result {
                Ok(record) if record.has_run_name() => corpus.push(record),
                Ok(_) => {
                    debug!(file = %path.display(), "No run name, record discarded");
                    report.discarded += 1;
                }
                Err(e) => {
                    warn!(file = %path.display(), "Discarding log: {}", e);
                    report.failures += 1;
                }
            }
        }

        snapshot::publish(&self.snapshot_path, &corpus)?;
        report.records = corpus.len();
        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Build forever, one cycle per interval
    ///
    /// Cycle work runs on the blocking pool. The wait after a cycle is the
    /// interval minus the cycle's duration, so an overrunning cycle is
    /// followed immediately by the next.
    pub async fn run(self) {
        let builder = Arc::new(self);
        info!(
            log_dir = %builder.log_dir.display(),
            snapshot = %builder.snapshot_path.display(),
            interval_secs = builder.interval.as_secs_f64(),
            "Corpus builder started"
        );

        loop {
            let started = Instant::now();
            let worker = Arc::clone(&builder);
            match tokio::task::spawn_blocking(move || worker.build_once()).await {
                Ok(Ok(report)) => info!(
                    files = report.files,
                    records = report.records,
                    discarded = report.discarded,
                    failures = report.failures,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Corpus published"
                ),
                Ok(Err(e)) => error!("Corpus build failed: {}", e),
                Err(e) => error!("Corpus build task failed: {}", e),
            }

            let wait = next_wait(builder.interval, started.elapsed());
            if wait.is_zero() {
                warn!("Corpus build overran the refresh interval, starting next cycle now");
            }
            tokio::time::sleep(wait).await;
        }
    }
}

/// Time left in the cycle; zero once `elapsed` reaches `interval`
pub fn next_wait(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Run `extract` on one file, turning a panic into a file-level error
fn extract_guarded<F>(path: &Path, extract: &F) -> Result<RunRecord, ExtractError>
where
    F: Fn(&Path) -> Result<RunRecord, ExtractError>,
{
    catch_unwind(AssertUnwindSafe(|| extract(path))).unwrap_or_else(|payload| {
        Err(ExtractError::Panicked(
            path.to_path_buf(),
            panic_message(payload.as_ref()),
        ))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
