//! Backup cycle
//!
//! One cycle snapshots the open documents into a brand new manifest:
//!
//! 1. Register each file-backed document's source with the file access list
//! 2. Write a backup for each unsaved document that isn't already fresh
//! 3. Persist the manifest
//! 4. Delete backup files the new manifest doesn't reference
//!
//! Cleanup only runs after the manifest write succeeded. Otherwise a crash
//! between the two could leave the still-current manifest pointing at
//! deleted backups.
//!
//! Cycles are serialized: concurrent callers queue on an async mutex.

use super::backup_store::{BackupFile, BackupStore};
use super::codec::SessionCodec;
use super::freshness::FreshnessTracker;
use crate::model::{DocumentEntry, DocumentId, LiveDocument, SessionManifest};
use crate::services::file_access::FileAccess;
use crate::services::host::EditingHost;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// What one cycle did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Entries in the persisted manifest
    pub documents: usize,
    /// Documents whose backup was (re)written
    pub written: Vec<DocumentId>,
    /// Documents whose fresh backup was reused without a write
    pub reused: Vec<DocumentId>,
    /// Documents left unprotected this round because their write failed
    pub failed: Vec<DocumentId>,
    /// Orphaned backup files removed
    pub deleted: Vec<String>,
}

enum BackupAction {
    Backed(BackupFile),
    Reused(BackupFile),
    /// Untitled and empty: nothing worth saving
    Omitted,
    Failed,
}

/// Writes backups and the manifest for the live documents
pub struct BackupCycleEngine {
    host: Arc<dyn EditingHost>,
    file_access: Arc<dyn FileAccess>,
    backups: Arc<dyn BackupStore>,
    codec: SessionCodec,
    freshness: FreshnessTracker,
    enabled: AtomicBool,
    cycle_lock: Mutex<()>,
}

impl BackupCycleEngine {
    pub fn new(
        host: Arc<dyn EditingHost>,
        file_access: Arc<dyn FileAccess>,
        backups: Arc<dyn BackupStore>,
        codec: SessionCodec,
        freshness: FreshnessTracker,
    ) -> Self {
        Self {
            host,
            file_access,
            backups,
            codec,
            freshness,
            enabled: AtomicBool::new(false),
            cycle_lock: Mutex::new(()),
        }
    }

    /// Whether cycles are allowed to run at all
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn freshness(&self) -> &FreshnessTracker {
        &self.freshness
    }

    /// Run one backup cycle
    ///
    /// Returns `None` when backups are disabled or the manifest could not be
    /// persisted. Never fails otherwise: per-document problems are logged and
    /// reported in the [`CycleReport`].
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        if !self.is_enabled() {
            tracing::trace!("Backups disabled, skipping cycle");
            return None;
        }

        let _guard = self.cycle_lock.lock().await;

        let documents = self.host.open_documents();
        let selected = self.host.selected_document().map(|d| d.id());

        let mut manifest = SessionManifest::new();
        let mut referenced: HashSet<String> = HashSet::new();
        let mut report = CycleReport::default();

        for document in &documents {
            let id = document.id();
            let source = document.source_file();

            if let Some(path) = &source {
                if let Err(e) = self.file_access.register(id, path).await {
                    tracing::warn!("Failed to register source of {}: {}", id, e);
                }
            }

            let entry = if document.has_unsaved_changes() {
                match self.backup_document(document.as_ref()).await {
                    BackupAction::Backed(file) => {
                        report.written.push(id);
                        referenced.insert(file.name.clone());
                        DocumentEntry::with_backup(id, file.manifest_path())
                    }
                    BackupAction::Reused(file) => {
                        report.reused.push(id);
                        referenced.insert(file.name.clone());
                        DocumentEntry::with_backup(id, file.manifest_path())
                    }
                    BackupAction::Omitted => continue,
                    BackupAction::Failed => {
                        report.failed.push(id);
                        // Not an orphan: the last good backup stays on disk until a
                        // later cycle overwrites it or the document closes
                        referenced.insert(id.backup_name());
                        continue;
                    }
                }
            } else {
                // Its backup is about to become an orphan
                if self.freshness.is_fresh(id) {
                    self.freshness.invalidate(id);
                }
                if source.is_none() {
                    continue;
                }
                DocumentEntry::clean(id)
            };

            if selected == Some(id) {
                manifest.selected_document = Some(id);
            }
            manifest.documents.push(entry);
        }

        if let Err(e) = self.codec.save(&manifest).await {
            tracing::error!("Failed to persist session, keeping existing backups: {}", e);
            return None;
        }
        report.documents = manifest.documents.len();

        report.deleted = self.delete_orphans(&referenced).await;

        let live: HashSet<DocumentId> = manifest.documents.iter().map(|e| e.id).collect();
        if let Err(e) = self.file_access.retain(&live).await {
            tracing::debug!("Failed to prune file access list: {}", e);
        }

        tracing::debug!(
            "Backup cycle: {} documents, {} written, {} reused, {} failed, {} deleted",
            report.documents,
            report.written.len(),
            report.reused.len(),
            report.failed.len(),
            report.deleted.len()
        );
        Some(report)
    }

    async fn backup_document(&self, document: &dyn LiveDocument) -> BackupAction {
        let id = document.id();
        let name = id.backup_name();

        if self.freshness.is_fresh(id) {
            return BackupAction::Reused(BackupFile {
                path: self.backups.dir().join(&name),
                name,
                modified: None,
            });
        }

        // Hook before snapshot so an edit racing the write is never missed
        self.freshness.watch(document);
        let generation = self.freshness.generation(id);
        let content = document.content();

        if document.source_file().is_none() && content.is_empty() {
            return BackupAction::Omitted;
        }

        match self.backups.write(&name, content.as_bytes()).await {
            Ok(file) => {
                self.freshness.mark_fresh_if_unchanged(id, generation);
                tracing::trace!("Backed up {} ({} bytes)", id, content.len());
                BackupAction::Backed(file)
            }
            Err(e) => {
                tracing::warn!("Failed to back up {}: {}", id, e);
                BackupAction::Failed
            }
        }
    }

    /// Delete every backup file not in `referenced`, best-effort
    async fn delete_orphans(&self, referenced: &HashSet<String>) -> Vec<String> {
        let files = match self.backups.list().await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("Failed to list backups for cleanup: {}", e);
                return Vec::new();
            }
        };

        let mut deleted = Vec::new();
        for file in files {
            // Foreign files in the folder are not ours to delete
            if referenced.contains(&file.name)
                || DocumentId::from_backup_name(&file.name).is_none()
            {
                continue;
            }
            match self.backups.delete(&file).await {
                Ok(()) => deleted.push(file.name),
                Err(e) => tracing::warn!("Failed to delete orphaned backup {}: {}", file.name, e),
            }
        }
        deleted
    }
}
