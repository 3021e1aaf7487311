//! XDG-compliant log directory management
//!
//! Logs are stored in `$XDG_STATE_HOME/fresh-session/logs/` (typically
//! `~/.local/state/fresh-session/logs/`), one file per process so concurrent
//! hosts don't interleave. Stale log files of dead processes are removed on
//! request.

use crate::services::session::lock::is_process_running;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

/// Minimum age for log files to be cleaned up (24 hours)
const CLEANUP_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Prefix of per-process log file names
const LOG_PREFIX: &str = "fresh-session-";

/// Cached log directory path
static LOG_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Get the base log directory, creating it if necessary.
///
/// Falls back to the system temp directory if the XDG directory can't be
/// determined or created.
pub fn log_dir() -> &'static PathBuf {
    LOG_DIR.get_or_init(|| {
        let fallback = std::env::temp_dir().join("fresh-session-logs");
        let dir = get_xdg_log_dir().unwrap_or_else(|| fallback.clone());

        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!("Failed to create log directory {:?}: {}", dir, e);
            return fallback;
        }

        dir
    })
}

/// Get the XDG state home log directory
fn get_xdg_log_dir() -> Option<PathBuf> {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(state_home);
        if path.is_absolute() {
            return Some(path.join("fresh-session").join("logs"));
        }
    }

    dirs::home_dir().map(|home| {
        home.join(".local")
            .join("state")
            .join("fresh-session")
            .join("logs")
    })
}

/// Log file for this process: `{log_dir}/fresh-session-{PID}.log`
pub fn main_log_path() -> PathBuf {
    log_dir().join(format!("{LOG_PREFIX}{}.log", std::process::id()))
}

/// Remove day-old log files of processes that are no longer running
pub fn cleanup_stale_logs() -> usize {
    cleanup_stale_logs_in_dir(log_dir(), std::process::id())
}

fn cleanup_stale_logs_in_dir(dir: &Path, current_pid: u32) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut cleaned = 0;
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        let Some(pid) = extract_pid_from_filename(&name) else {
            continue;
        };
        if pid == current_pid || is_process_running(pid) {
            continue;
        }
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false)
            || !is_file_older_than(&entry.path(), CLEANUP_AGE)
        {
            continue;
        }

        match fs::remove_file(entry.path()) {
            Ok(()) => {
                tracing::debug!("Cleaned up stale log file: {:?}", entry.path());
                cleaned += 1;
            }
            Err(e) => tracing::debug!("Failed to clean up stale log {:?}: {}", entry.path(), e),
        }
    }
    cleaned
}

/// Check if a file is older than the specified duration
fn is_file_older_than(path: &Path, age: Duration) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };

    SystemTime::now()
        .duration_since(modified)
        .map(|elapsed| elapsed > age)
        .unwrap_or(false)
}

/// Extract the PID from a log file name like "fresh-session-12345.log"
fn extract_pid_from_filename(name: &str) -> Option<u32> {
    name.strip_prefix(LOG_PREFIX)?
        .strip_suffix(".log")?
        .parse()
        .ok()
}
