//! vbd-dash - Benchmark dashboard data service
//!
//! Polls the published corpus snapshot and serves the projected run table,
//! model display information and a CSV export over HTTP. With
//! `--with-ingest` the corpus builder runs in the same process.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use vbd_common::config::{ConfigOverrides, DashboardConfig};
use vbd_dash::{build_router, AppState, SnapshotCache};
use vbd_ingest::CorpusBuilder;

/// Command-line arguments for vbd-dash
#[derive(Parser, Debug)]
#[command(name = "vbd-dash")]
#[command(about = "Benchmark dashboard data service")]
#[command(version)]
struct Args {
    /// TOML config file (defaults to ~/.config/vbd/config.toml)
    #[arg(short, long, env = "VBD_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    bind: Option<String>,

    /// Snapshot file to serve
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Seconds between snapshot reloads
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Also run the corpus builder in this process
    #[arg(long)]
    with_ingest: bool,

    /// Log directory for the in-process builder
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Seconds between corpus rebuilds for the in-process builder
    #[arg(long)]
    refresh_interval: Option<u64>,

    /// Extraction worker threads for the in-process builder
    #[arg(short, long)]
    workers: Option<usize>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_dir: self.log_dir.clone(),
            snapshot_path: self.snapshot.clone(),
            refresh_interval_secs: self.refresh_interval,
            poll_interval_secs: self.poll_interval,
            workers: self.workers,
            bind_addr: self.bind.clone(),
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

    info!("Starting vbd-dash v{}", env!("CARGO_PKG_VERSION"));
    info!("Snapshot: {}", config.snapshot_path.display());

    if args.with_ingest {
        let builder =
            CorpusBuilder::from_config(&config).context("Failed to create corpus builder")?;
        info!("Corpus builder enabled for {}", config.log_dir.display());
        tokio::spawn(builder.run());
    }

    let cache = Arc::new(SnapshotCache::new(&config.snapshot_path));
    if let Err(e) = cache.refresh().await {
        warn!("Initial snapshot load failed: {}", e);
    }
    Arc::clone(&cache).spawn_poller(config.poll_interval());

    let app = build_router(AppState::new(cache));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("vbd-dash listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
