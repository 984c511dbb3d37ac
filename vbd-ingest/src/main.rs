//! vbd-ingest - Training log corpus builder
//!
//! Scans the log directory, extracts one run record per log file and
//! publishes the corpus snapshot read by the dashboard. Runs one cycle per
//! refresh interval, or a single cycle with `--once`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use vbd_common::config::{ConfigOverrides, DashboardConfig};
use vbd_ingest::CorpusBuilder;

/// Command-line arguments for vbd-ingest
#[derive(Parser, Debug)]
#[command(name = "vbd-ingest")]
#[command(about = "Builds the benchmark run corpus from training logs")]
#[command(version)]
struct Args {
    /// TOML config file (defaults to ~/.config/vbd/config.toml)
    #[arg(short, long, env = "VBD_CONFIG")]
    config: Option<PathBuf>,

    /// Directory containing *.log training logs
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Snapshot file to publish
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Seconds between corpus rebuilds
    #[arg(long)]
    interval: Option<u64>,

    /// Extraction worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Build the corpus once and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_dir: self.log_dir.clone(),
            snapshot_path: self.snapshot.clone(),
            refresh_interval_secs: self.interval,
            workers: self.workers,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = DashboardConfig::resolve(&args.overrides(), args.config.as_deref())
        .context("Failed to resolve configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .init();

    info!("Starting vbd-ingest v{}", env!("CARGO_PKG_VERSION"));
    info!("Log directory: {}", config.log_dir.display());
    info!("Snapshot: {}", config.snapshot_path.display());
    info!("Workers: {}", config.workers);

    let builder = CorpusBuilder::from_config(&config).context("Failed to create corpus builder")?;

    if args.once {
        let report = tokio::task::spawn_blocking(move || builder.build_once())
            .await
            .context("Corpus build task failed")?
            .context("Corpus build failed")?;
        info!(
            "Published {} records from {} files ({} discarded, {} failed) in {:?}",
            report.records, report.files, report.discarded, report.failures, report.elapsed
        );
        return Ok(());
    }

    tokio::select! {
        _ = builder.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    Ok(())
}
