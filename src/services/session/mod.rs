//! Session persistence and crash recovery
//!
//! Keeps the editing session recoverable: every few seconds each open,
//! unsaved document is snapshotted to a backup folder and a small manifest
//! records which documents were open. On the next start the session is
//! rebuilt from that manifest, with backups substituted for their source
//! files when they are at least as new.
//!
//! ## How it works
//!
//! 1. **Restore**: On startup, `restore()` reopens the documents of the last
//!    manifest (once per process, and always before the first backup cycle)
//! 2. **Backup cycles**: `enable_backups()` starts a loop that writes backups
//!    for unsaved documents, then the manifest, then deletes orphans
//! 3. **Freshness**: documents whose backup still matches their content are
//!    not rewritten; any edit makes them stale again
//! 4. **Shutdown**: `disable_backups()` stops the loop and runs a final cycle
//!
//! ## File Layout
//!
//! ```text
//! ~/.local/share/fresh-session/
//! ├── session.json          # Key-value store holding the manifest
//! ├── file-access.json      # Source file of each document, by id
//! ├── session.lock          # Owning process (crash detection)
//! └── backups/
//!     ├── 000000000000002a.backup
//!     └── ...
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fresh_session::services::session::SessionManager;
//! use fresh_session::services::tracing_setup;
//!
//! // On startup
//! tracing_setup::init_default()?;
//! let manager = SessionManager::new(config, &dirs, host);
//! manager.restore().await;
//! manager.enable_backups().await;
//!
//! // Whenever the host opens or closes a document
//! manager.document_opened(&document);
//! manager.document_closed(id);
//!
//! // On shutdown
//! manager.disable_backups().await;
//! ```

pub mod backup_store;
pub mod codec;
pub mod cycle;
pub mod error;
pub mod freshness;
pub mod lock;
pub mod restore;
pub mod scheduler;

pub use backup_store::{BackupFile, BackupStore, DiskBackupStore};
pub use codec::{FileSessionStore, MemorySessionStore, SessionCodec, SessionStore};
pub use cycle::{BackupCycleEngine, CycleReport};
pub use error::{SessionError, SessionResult};
pub use freshness::FreshnessTracker;
pub use lock::{SessionInfo, SessionLock};
pub use restore::{RestoreEngine, RestoreOutcome};
pub use scheduler::PeriodicScheduler;

use crate::config::SessionConfig;
use crate::config_io::DirectoryContext;
use crate::model::{DocumentHandle, DocumentId};
use crate::services::file_access::{FileAccess, FileAccessRegistry};
use crate::services::host::EditingHost;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Collaborators a [`SessionManager`] is built from
pub struct SessionParts {
    pub host: Arc<dyn EditingHost>,
    pub file_access: Arc<dyn FileAccess>,
    pub backups: Arc<dyn BackupStore>,
    pub store: Arc<dyn SessionStore>,
    /// Crash detection is skipped without a lock
    pub lock: Option<SessionLock>,
}

/// Owns the session engine for one editing host
///
/// The host creates exactly one manager and passes it where it is needed.
pub struct SessionManager {
    config: SessionConfig,
    codec: SessionCodec,
    freshness: FreshnessTracker,
    restore: RestoreEngine,
    cycle: Arc<BackupCycleEngine>,
    scheduler: PeriodicScheduler,
    lock: Option<SessionLock>,
    loaded: AtomicBool,
    restore_lock: Mutex<()>,
    crash_check: OnceCell<bool>,
}

impl SessionManager {
    /// Create a manager storing everything on disk under `dirs`
    pub fn new(config: SessionConfig, dirs: &DirectoryContext, host: Arc<dyn EditingHost>) -> Self {
        let parts = SessionParts {
            host,
            file_access: Arc::new(FileAccessRegistry::new(dirs.file_access_path())),
            backups: Arc::new(DiskBackupStore::new(dirs.backup_dir(&config))),
            store: Arc::new(FileSessionStore::new(dirs.session_store_path())),
            lock: Some(SessionLock::new(dirs.lock_path())),
        };
        Self::with_parts(config, parts)
    }

    /// Create a manager from explicit collaborators
    pub fn with_parts(config: SessionConfig, parts: SessionParts) -> Self {
        let freshness = FreshnessTracker::new();
        let codec = SessionCodec::new(parts.store, config.session_key.clone());

        let restore = RestoreEngine::new(
            parts.host.clone(),
            parts.file_access.clone(),
            parts.backups.clone(),
            freshness.clone(),
        );
        let cycle = Arc::new(BackupCycleEngine::new(
            parts.host,
            parts.file_access,
            parts.backups,
            codec.clone(),
            freshness.clone(),
        ));
        let scheduler = PeriodicScheduler::new(cycle.clone(), config.backup_interval());

        Self {
            config,
            codec,
            freshness,
            restore,
            cycle,
            scheduler,
            lock: parts.lock,
            loaded: AtomicBool::new(false),
            restore_lock: Mutex::new(()),
            crash_check: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn freshness(&self) -> &FreshnessTracker {
        &self.freshness
    }

    /// Whether `restore()` has completed in this process
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Whether backup cycles are currently allowed
    pub fn backups_enabled(&self) -> bool {
        self.cycle.is_enabled()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Reopen the documents of the last saved session
    ///
    /// Runs once per process; later calls return an empty outcome. A missing
    /// or unreadable manifest restores nothing. If the host hasn't called it,
    /// [`enable_backups`](Self::enable_backups) and
    /// [`save_now`](Self::save_now) do before running any cycle.
    pub async fn restore(&self) -> RestoreOutcome {
        if !self.config.enabled {
            return RestoreOutcome::default();
        }
        let _guard = self.restore_lock.lock().await;
        if self.is_loaded() {
            tracing::debug!("Session already restored");
            return RestoreOutcome::default();
        }

        let outcome = match self.codec.load().await {
            Some(manifest) => self.restore.restore(&manifest).await,
            None => RestoreOutcome::default(),
        };
        self.loaded.store(true, Ordering::SeqCst);
        outcome
    }

    /// Reopen the previous session unless that already happened; any cycle
    /// before it treats the old backups as orphans
    async fn ensure_restored(&self) {
        if !self.is_loaded() {
            tracing::debug!("Restoring previous session before the first backup cycle");
            self.restore().await;
        }
    }

    /// Whether the previous session ended without a clean shutdown
    ///
    /// Checked once, before this process takes the lock.
    pub async fn previous_session_crashed(&self) -> bool {
        let Some(lock) = &self.lock else {
            return false;
        };
        *self
            .crash_check
            .get_or_init(|| async {
                lock.detect_crash().await.unwrap_or_else(|e| {
                    tracing::debug!("Could not read session lock: {}", e);
                    false
                })
            })
            .await
    }

    /// Start periodic backups (call at host startup, after `restore()`)
    ///
    /// Returns whether the scheduler is running.
    pub async fn enable_backups(&self) -> bool {
        if !self.config.enabled {
            tracing::debug!("Session backups disabled by config");
            return false;
        }

        self.ensure_restored().await;
        if self.previous_session_crashed().await {
            tracing::info!("Previous session did not shut down cleanly");
        }
        if let Some(lock) = &self.lock {
            if let Err(e) = lock.acquire().await {
                tracing::warn!("Failed to write session lock: {}", e);
            }
        }

        self.scheduler.start()
    }

    /// Stop periodic backups and flush one last cycle (call at host shutdown)
    pub async fn disable_backups(&self) -> Option<CycleReport> {
        self.scheduler.shutdown().await;

        let report = self.cycle.run_cycle().await;
        self.cycle.set_enabled(false);

        if let Some(lock) = &self.lock {
            if let Err(e) = lock.release().await {
                tracing::warn!("Failed to remove session lock: {}", e);
            }
        }
        report
    }

    /// Run a backup cycle now, queued behind any cycle in progress
    pub async fn save_now(&self) -> Option<CycleReport> {
        if !self.config.enabled {
            return None;
        }
        self.ensure_restored().await;
        self.cycle.run_cycle().await
    }

    /// Forget the saved session; backup files are left for the next cycle
    /// to clean up
    pub async fn clear(&self) -> bool {
        match self.codec.clear().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to clear saved session: {}", e);
                false
            }
        }
    }

    // ========================================================================
    // Document notifications
    // ========================================================================

    /// Start tracking edits of a document the host just opened
    pub fn document_opened(&self, document: &DocumentHandle) {
        self.freshness.watch(document.as_ref());
    }

    /// Stop tracking a document the host just closed
    pub fn document_closed(&self, id: DocumentId) {
        self.freshness.forget(id);
    }
}
