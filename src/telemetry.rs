use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Initialize tracing output.
///
/// With no log file, logs go to stdout; otherwise they append to
/// `<config_dir>/vox.log`. `VOX_LOG` overrides the filter (default `info`).
///
/// # Errors
/// Returns an error if the log file cannot be created.
pub fn init(log_to_file: bool, config_dir: &Path) -> Result<()> {
    let filter = EnvFilter::try_from_env("VOX_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    if !log_to_file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
        return Ok(());
    }

    let log_path = log_file_path(config_dir);
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("failed to create log directory")?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("failed to open log file")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file)
        .with_target(false)
        .with_ansi(false)
        .init();

    tracing::info!(path = %log_path.display(), "logging to file");
    Ok(())
}

fn log_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join("vox.log")
}
