//! Tracing subscriber setup
//!
//! Shared tracing configuration for the host process and tests.

use crate::services::log_dirs;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber, logging to `log_file_path`.
///
/// Filtering follows `RUST_LOG`, defaulting to INFO. Fails if the log file
/// can't be created or a global subscriber is already set.
pub fn init_global(log_file_path: &Path) -> io::Result<()> {
    let log_file = File::create(log_file_path)?;
    build_subscriber(log_file)
        .try_init()
        .map_err(io::Error::other)
}

/// Install the global subscriber writing to this process's file in the log
/// directory, after removing stale logs of dead processes.
///
/// Returns the path of the log file.
pub fn init_default() -> io::Result<PathBuf> {
    let cleaned = log_dirs::cleanup_stale_logs();
    let path = log_dirs::main_log_path();
    init_global(&path)?;
    if cleaned > 0 {
        tracing::debug!("Removed {} stale log files", cleaned);
    }
    Ok(path)
}

/// Build a subscriber writing formatted events to `log_file`.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_ansi(false).with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
}
