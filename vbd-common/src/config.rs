//! Configuration loading and resolution
//!
//! Every setting is resolved independently in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

pub const ENV_LOG_DIR: &str = "VBD_LOG_DIR";
pub const ENV_SNAPSHOT: &str = "VBD_SNAPSHOT";
pub const ENV_REFRESH_SECS: &str = "VBD_REFRESH_SECS";
pub const ENV_POLL_SECS: &str = "VBD_POLL_SECS";
pub const ENV_WORKERS: &str = "VBD_WORKERS";
pub const ENV_BIND: &str = "VBD_BIND";

/// Compiled-in defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub log_dir: PathBuf,
    pub snapshot_path: PathBuf,
    pub refresh_interval_secs: u64,
    pub poll_interval_secs: u64,
    pub workers: usize,
    pub bind_addr: String,
    pub log_level: String,
}

impl Default for CompiledDefaults {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logging"),
            snapshot_path: PathBuf::from("data").join("data.json"),
            refresh_interval_secs: 10,
            poll_interval_secs: 10,
            workers: 5,
            bind_addr: "127.0.0.1:5730".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Logging section of the TOML file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (e.g. "info", "vbd_ingest=debug")
    pub level: Option<String>,
}

/// TOML configuration file contents; every field optional
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    pub log_dir: Option<PathBuf>,
    pub snapshot_path: Option<PathBuf>,
    pub refresh_interval_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub workers: Option<usize>,
    pub bind_addr: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub log_dir: Option<PathBuf>,
    pub snapshot_path: Option<PathBuf>,
    pub refresh_interval_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub workers: Option<usize>,
    pub bind_addr: Option<String>,
}

/// Fully resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// Directory scanned for `*.log` training logs
    pub log_dir: PathBuf,
    /// Where the corpus snapshot is published
    pub snapshot_path: PathBuf,
    /// Corpus rebuild interval
    pub refresh_interval_secs: u64,
    /// How often readers reload the snapshot
    pub poll_interval_secs: u64,
    /// Extraction worker pool size
    pub workers: usize,
    pub bind_addr: String,
    pub log_level: String,
}

impl DashboardConfig {
    /// Resolve configuration from CLI overrides, environment, TOML and defaults
    ///
    /// `config_file` names an explicit TOML file; without one the per-user
    /// default location is tried. A missing file is not an error.
    pub fn resolve(overrides: &ConfigOverrides, config_file: Option<&Path>) -> Result<Self> {
        let toml_config = load_toml_config(config_file)?;
        Self::resolve_with(overrides, &toml_config, &CompiledDefaults::default())
    }

    /// Resolve against an already-loaded TOML config
    pub fn resolve_with(
        overrides: &ConfigOverrides,
        toml_config: &TomlConfig,
        defaults: &CompiledDefaults,
    ) -> Result<Self> {
        let config = Self {
            log_dir: pick(
                overrides.log_dir.clone(),
                env_var(ENV_LOG_DIR)?,
                toml_config.log_dir.clone(),
                defaults.log_dir.clone(),
            ),
            snapshot_path: pick(
                overrides.snapshot_path.clone(),
                env_var(ENV_SNAPSHOT)?,
                toml_config.snapshot_path.clone(),
                defaults.snapshot_path.clone(),
            ),
            refresh_interval_secs: pick(
                overrides.refresh_interval_secs,
                env_var(ENV_REFRESH_SECS)?,
                toml_config.refresh_interval_secs,
                defaults.refresh_interval_secs,
            ),
            poll_interval_secs: pick(
                overrides.poll_interval_secs,
                env_var(ENV_POLL_SECS)?,
                toml_config.poll_interval_secs,
                defaults.poll_interval_secs,
            ),
            workers: pick(
                overrides.workers,
                env_var(ENV_WORKERS)?,
                toml_config.workers,
                defaults.workers,
            ),
            bind_addr: pick(
                overrides.bind_addr.clone(),
                env_var(ENV_BIND)?,
                toml_config.bind_addr.clone(),
                defaults.bind_addr.clone(),
            ),
            log_level: toml_config
                .logging
                .level
                .clone()
                .unwrap_or_else(|| defaults.log_level.clone()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.refresh_interval_secs == 0 {
            return Err(Error::Config("refresh_interval_secs must be at least 1".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Per-user config file location (`~/.config/vbd/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vbd").join("config.toml"))
}

/// Load the TOML config file
///
/// A missing file yields defaults with a warning; a file that exists but
/// does not parse is a configuration error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => path,
        None => return Ok(TomlConfig::default()),
    };

    if !path.exists() {
        warn!("Config file not found: {} (using defaults)", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    info!("Loaded config file {}", path.display());
    Ok(config)
}

fn pick<T>(cli: Option<T>, env: Option<T>, file: Option<T>, default: T) -> T {
    cli.or(env).or(file).unwrap_or(default)
}

fn env_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}
