//! Shared logging utilities for GridFlow binaries.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "gridflow=info,gridflow_controller=info,gridflow_db=info,gridflow_grid=info";

/// Logging configuration shared by GridFlow binaries.
pub struct LogConfig {
    /// Raise the console filter to match the file filter.
    pub verbose: bool,
    /// Controller mode appends to `<prod_dir>/<name>.log` as well.
    pub log_file: Option<PathBuf>,
}

impl LogConfig {
    pub fn console(verbose: bool) -> Self {
        Self {
            verbose,
            log_file: None,
        }
    }

    pub fn with_file(verbose: bool, log_file: PathBuf) -> Self {
        Self {
            verbose,
            log_file: Some(log_file),
        }
    }
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Initialize tracing with stderr output and an optional append-mode file
/// layer. A subscriber installed earlier in the process wins silently, so
/// front-ends can hand over to the in-process controller without a fight.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let console_filter = if config.verbose {
        EnvFilter::new("debug")
    } else {
        default_filter()
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let registry = tracing_subscriber::registry().with(console_layer);

    match config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .with_filter(default_filter());
            let _ = registry.with(file_layer).try_init();
        }
        None => {
            let _ = registry.try_init();
        }
    }
    Ok(())
}
