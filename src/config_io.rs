//! Runtime directory layout
//!
//! Locates the data and config directories used for session state. Only
//! `main()`-level code should call [`DirectoryContext::from_system`]; tests
//! root everything in a temp dir with [`DirectoryContext::for_testing`].

use crate::config::{ConfigError, SessionConfig};
use std::io;
use std::path::{Path, PathBuf};

/// Directories holding session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryContext {
    /// Data directory for persistent state (manifest, backups, lock)
    /// e.g., ~/.local/share/fresh-session on Linux
    pub data_dir: PathBuf,

    /// Config directory for user configuration
    /// e.g., ~/.config/fresh-session on Linux
    pub config_dir: PathBuf,
}

impl DirectoryContext {
    const APP_DIR: &'static str = "fresh-session";

    /// Create a DirectoryContext from the system directories
    pub fn from_system() -> io::Result<Self> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "Could not determine data directory",
                )
            })?
            .join(Self::APP_DIR);

        let config_dir = dirs::config_dir()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "Could not determine config directory",
                )
            })?
            .join(Self::APP_DIR);

        Ok(Self {
            data_dir,
            config_dir,
        })
    }

    /// Root everything under `root`
    pub fn for_testing(root: &Path) -> Self {
        Self {
            data_dir: root.join("data"),
            config_dir: root.join("config"),
        }
    }

    /// Folder holding backup files
    pub fn backup_dir(&self, config: &SessionConfig) -> PathBuf {
        self.data_dir.join(&config.backup_dir_name)
    }

    /// File backing the key-value session store
    pub fn session_store_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    /// File holding source file tokens
    pub fn file_access_path(&self) -> PathBuf {
        self.data_dir.join("file-access.json")
    }

    /// Crash detection lock file
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("session.lock")
    }

    /// User config file
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("session.json")
    }

    /// Load the user config, falling back to defaults if there is none
    ///
    /// A present but invalid config file is an error.
    pub fn load_config(&self) -> Result<SessionConfig, ConfigError> {
        let path = self.config_path();
        if !path.exists() {
            tracing::debug!("No session config at {:?}, using defaults", path);
            return Ok(SessionConfig::default());
        }
        SessionConfig::load_from_file(&path)
    }
}
