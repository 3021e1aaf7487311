//! Backup file storage
//!
//! Backups live in one dedicated folder, created lazily on the first write.
//! Each document has at most one backup, named from its id, which is
//! overwritten in place on every write.
//!
//! ## File Layout
//!
//! ```text
//! ~/.local/share/fresh-session/backups/
//! ├── 000000000000002a.backup   # latest content of document 0x2a
//! ├── 00000000000000ff.backup
//! └── ...
//! ```

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A backup file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    /// File name within the backup folder
    pub name: String,
    /// Full path, as recorded in the manifest
    pub path: PathBuf,
    /// Last modification time, if the platform reports one
    pub modified: Option<SystemTime>,
}

impl BackupFile {
    /// Path as stored in the manifest
    pub fn manifest_path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Backup folder operations
///
/// All operations are async so a slow disk never blocks the caller's thread.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Folder holding the backups
    fn dir(&self) -> &Path;

    /// Create or overwrite the backup called `name`
    async fn write(&self, name: &str, content: &[u8]) -> io::Result<BackupFile>;

    /// Every file currently in the backup folder
    ///
    /// A missing folder is an empty store, not an error.
    async fn list(&self) -> io::Result<Vec<BackupFile>>;

    /// Delete one backup file
    async fn delete(&self, file: &BackupFile) -> io::Result<()>;

    /// Look up a backup by the path recorded in a manifest
    ///
    /// Returns `Ok(None)` if nothing is there.
    async fn locate(&self, path: &Path) -> io::Result<Option<BackupFile>>;

    /// Read a backup's content as text
    async fn read(&self, file: &BackupFile) -> io::Result<String>;
}

/// Backup store on the local filesystem
#[derive(Debug, Clone)]
pub struct DiskBackupStore {
    backup_dir: PathBuf,
}

impl DiskBackupStore {
    /// Extension used for in-flight writes
    const TEMP_EXT: &'static str = "tmp";

    pub fn new(backup_dir: PathBuf) -> Self {
        Self { backup_dir }
    }

    async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.backup_dir).await
    }

    /// Write to a temp file, then rename over the target
    async fn atomic_write(&self, target: &Path, content: &[u8]) -> io::Result<()> {
        let temp_path = target.with_extension(Self::TEMP_EXT);

        tokio::fs::write(&temp_path, content).await?;

        if let Err(e) = tokio::fs::rename(&temp_path, target).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
        Ok(())
    }

    fn file_name(path: &Path) -> Option<String> {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
    }
}

#[async_trait]
impl BackupStore for DiskBackupStore {
    fn dir(&self) -> &Path {
        &self.backup_dir
    }

    async fn write(&self, name: &str, content: &[u8]) -> io::Result<BackupFile> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid backup name {name:?}"),
            ));
        }
        self.ensure_dir().await?;

        let path = self.backup_dir.join(name);
        self.atomic_write(&path, content).await?;

        let modified = tokio::fs::metadata(&path)
            .await
            .ok()
            .and_then(|m| m.modified().ok());

        tracing::trace!("Wrote backup {} ({} bytes)", name, content.len());
        Ok(BackupFile {
            name: name.to_string(),
            path,
            modified,
        })
    }

    async fn list(&self) -> io::Result<Vec<BackupFile>> {
        let mut read_dir = match tokio::fs::read_dir(&self.backup_dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                // Raced with a delete
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(|s| s.to_string()) else {
                continue;
            };
            files.push(BackupFile {
                name,
                path: entry.path(),
                modified: metadata.modified().ok(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn delete(&self, file: &BackupFile) -> io::Result<()> {
        match tokio::fs::remove_file(&file.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn locate(&self, path: &Path) -> io::Result<Option<BackupFile>> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if !metadata.is_file() {
            return Ok(None);
        }
        let Some(name) = Self::file_name(path) else {
            return Ok(None);
        };
        Ok(Some(BackupFile {
            name,
            path: path.to_path_buf(),
            modified: metadata.modified().ok(),
        }))
    }

    async fn read(&self, file: &BackupFile) -> io::Result<String> {
        let bytes = tokio::fs::read(&file.path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
