//! Session lock for crash detection
//!
//! A lock file holding the owning process id is written while backups are
//! enabled and removed on clean shutdown. Finding a lock whose process is
//! gone on startup means the previous session crashed.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Session information stored in the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Process ID of the host
    pub pid: u32,

    /// Unix timestamp when the session started
    pub started_at: u64,

    /// Working directory
    pub working_dir: Option<PathBuf>,
}

impl SessionInfo {
    /// Session info for the current process
    pub fn current() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            pid: std::process::id(),
            started_at: now,
            working_dir: std::env::current_dir().ok(),
        }
    }

    /// Check if the owning process is still running
    pub fn is_running(&self) -> bool {
        is_process_running(self.pid)
    }
}

/// The lock file itself
#[derive(Debug, Clone)]
pub struct SessionLock {
    path: PathBuf,
}

impl SessionLock {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the lock for the current process
    pub async fn acquire(&self) -> io::Result<SessionInfo> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let info = SessionInfo::current();
        let json = serde_json::to_string_pretty(&info).map_err(io::Error::other)?;

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, json.as_bytes()).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(info)
    }

    /// Remove the lock (clean shutdown)
    pub async fn release(&self) -> io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Read the lock file, if any
    pub async fn read(&self) -> io::Result<Option<SessionInfo>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let info: SessionInfo = serde_json::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(info))
    }

    /// Check if there was a crash (lock file exists but process not running)
    ///
    /// A lock owned by this very process is not a crash.
    pub async fn detect_crash(&self) -> io::Result<bool> {
        match self.read().await? {
            Some(info) => Ok(info.pid != std::process::id() && !info.is_running()),
            None => Ok(false),
        }
    }
}

/// Check if a process with the given PID is running
#[cfg(unix)]
pub(crate) fn is_process_running(pid: u32) -> bool {
    // kill(pid, 0): 0 if we may signal it, EPERM if it exists but isn't ours
    let result = unsafe { libc::kill(pid as i32, 0) };
    if result == 0 {
        return true;
    }
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
    errno == libc::EPERM
}

#[cfg(windows)]
pub(crate) fn is_process_running(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, STILL_ACTIVE};
    use windows_sys::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            return false;
        }
        let mut exit_code: u32 = 0;
        let result = GetExitCodeProcess(handle, &mut exit_code);
        CloseHandle(handle);
        result != 0 && exit_code == STILL_ACTIVE as u32
    }
}

#[cfg(not(any(unix, windows)))]
pub(crate) fn is_process_running(_pid: u32) -> bool {
    false
}
