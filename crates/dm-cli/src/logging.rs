//! Logging setup for the `dm` binary.
//!
//! The library crates log through the `log` facade. Those records are
//! bridged into a `tracing-subscriber` registry with two layers: the
//! console (stderr) and a plain-text file under the logs directory.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// File name of the run log inside the logs directory.
pub(crate) const LOG_FILE_NAME: &str = "migration.log";

/// `RUST_LOG` wins; otherwise `debug` with `--verbose`, `info` without.
pub(crate) fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber. Call once, before any command runs.
pub(crate) fn init(logs_dir: &Path, verbose: bool) -> Result<()> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create logs directory {}", logs_dir.display()))?;
    let log_path = logs_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose),
        )
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .try_init()
        .context("Failed to install log subscriber")?;

    log::debug!("Logging to {}", log_path.display());
    Ok(())
}
