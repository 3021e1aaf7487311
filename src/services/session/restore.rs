//! Session restore
//!
//! Rebuilds the editing session from a manifest: reopens source files and
//! substitutes backup content where the backup is at least as new as the
//! file. Each manifest entry is restored in isolation; one bad entry never
//! stops the others.

use super::backup_store::{BackupFile, BackupStore};
use super::error::SessionResult;
use super::freshness::FreshnessTracker;
use crate::model::{DocumentEntry, DocumentHandle, DocumentId, SessionManifest};
use crate::services::file_access::FileAccess;
use crate::services::host::{EditingHost, OpenSource};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// What happened to one manifest entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRestore {
    /// Opened from its source file as-is
    FromSource,
    /// Opened from its source file with newer backup content substituted
    FromSourceWithBackup,
    /// Source file was newer; backup ignored
    StaleBackupIgnored,
    /// Reopened as an untitled document seeded from its backup
    UntitledFromBackup,
}

/// Summary of a restore pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Documents opened, in manifest order
    pub opened: Vec<DocumentId>,
    /// Documents whose content now comes from a backup
    pub adopted_backups: Vec<DocumentId>,
    /// Entries with nothing left to restore
    pub dropped: Vec<DocumentId>,
    /// Entries that failed to restore
    pub failed: Vec<DocumentId>,
    /// Document that was given focus
    pub selected: Option<DocumentId>,
}

impl RestoreOutcome {
    pub fn is_empty(&self) -> bool {
        self.opened.is_empty()
    }
}

struct RestoredDocument {
    document: DocumentHandle,
    kind: EntryRestore,
}

/// Reconstructs documents from a session manifest
pub struct RestoreEngine {
    host: Arc<dyn EditingHost>,
    file_access: Arc<dyn FileAccess>,
    backups: Arc<dyn BackupStore>,
    freshness: FreshnessTracker,
}

impl RestoreEngine {
    pub fn new(
        host: Arc<dyn EditingHost>,
        file_access: Arc<dyn FileAccess>,
        backups: Arc<dyn BackupStore>,
        freshness: FreshnessTracker,
    ) -> Self {
        Self {
            host,
            file_access,
            backups,
            freshness,
        }
    }

    /// Restore every entry of `manifest` and focus the selected document
    pub async fn restore(&self, manifest: &SessionManifest) -> RestoreOutcome {
        let mut outcome = RestoreOutcome::default();
        let mut selected: Option<DocumentHandle> = None;

        for entry in &manifest.documents {
            match self.restore_entry(entry).await {
                Ok(None) => {
                    tracing::debug!("Nothing to restore for {}", entry.id);
                    outcome.dropped.push(entry.id);
                }
                Ok(Some(restored)) => {
                    tracing::debug!("Restored {} ({:?})", entry.id, restored.kind);
                    outcome.opened.push(entry.id);
                    if matches!(
                        restored.kind,
                        EntryRestore::FromSourceWithBackup | EntryRestore::UntitledFromBackup
                    ) {
                        outcome.adopted_backups.push(entry.id);
                    }
                    if manifest.selected_document == Some(entry.id) {
                        selected = Some(restored.document);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to restore {}: {}", entry.id, e);
                    outcome.failed.push(entry.id);
                }
            }
        }

        if let Some(document) = selected {
            outcome.selected = Some(document.id());
            self.host.switch_to(&document);
        }

        tracing::info!(
            "Restored {} documents ({} from backups, {} failed)",
            outcome.opened.len(),
            outcome.adopted_backups.len(),
            outcome.failed.len()
        );
        outcome
    }

    async fn restore_entry(
        &self,
        entry: &DocumentEntry,
    ) -> SessionResult<Option<RestoredDocument>> {
        let id = entry.id;
        let source = self.file_access.resolve(id).await?;
        let backup = match entry.backup_path.as_deref() {
            Some(path) => self.backups.locate(Path::new(path)).await?,
            None => None,
        };

        let restored = match (source, backup) {
            (None, None) => return Ok(None),
            (None, Some(backup)) => {
                let content = self.backups.read(&backup).await?;
                let document = self
                    .host
                    .open_document(OpenSource::Content(content), id, true)
                    .await?;
                self.freshness.watch(document.as_ref());
                self.mark_adopted(id, &backup);
                RestoredDocument {
                    document,
                    kind: EntryRestore::UntitledFromBackup,
                }
            }
            (Some(path), None) => {
                let document = self
                    .host
                    .open_document(OpenSource::File(path), id, false)
                    .await?;
                self.freshness.watch(document.as_ref());
                RestoredDocument {
                    document,
                    kind: EntryRestore::FromSource,
                }
            }
            (Some(path), Some(backup)) => {
                let source_modified = modified_time(&path).await;
                let document = self
                    .host
                    .open_document(OpenSource::File(path), id, false)
                    .await?;
                self.freshness.watch(document.as_ref());

                let kind = if backup_is_current(backup.modified, source_modified) {
                    self.adopt_backup(&document, &backup).await
                } else {
                    tracing::debug!("Backup of {} is older than its source, ignoring", id);
                    EntryRestore::StaleBackupIgnored
                };
                RestoredDocument { document, kind }
            }
        };

        Ok(Some(restored))
    }

    /// Record that a document's content now equals `backup`
    ///
    /// Only a backup at the path the cycle would write to can be reused as
    /// fresh; one found elsewhere (e.g. an older backup folder) gets
    /// rewritten by the next cycle.
    fn mark_adopted(&self, id: DocumentId, backup: &BackupFile) {
        if backup.path == self.backups.dir().join(id.backup_name()) {
            self.freshness.mark_fresh(id);
        } else {
            tracing::debug!("Backup of {} at {:?} is outside the backup folder", id, backup.path);
        }
    }

    /// Substitute backup content into an already-open document
    ///
    /// The document stays open with its source content if the backup can't
    /// be read.
    async fn adopt_backup(&self, document: &DocumentHandle, backup: &BackupFile) -> EntryRestore {
        match self.backups.read(backup).await {
            Ok(content) => {
                document.replace_content(content);
                self.mark_adopted(document.id(), backup);
                EntryRestore::FromSourceWithBackup
            }
            Err(e) => {
                tracing::warn!(
                    "Could not read backup {:?} for {}: {}",
                    backup.path,
                    document.id(),
                    e
                );
                EntryRestore::FromSource
            }
        }
    }
}

/// Whether a backup should win over its source file
///
/// Ties favor the backup. A backup with an unknown timestamp never wins; a
/// source with an unknown timestamp always loses.
pub fn backup_is_current(backup: Option<SystemTime>, source: Option<SystemTime>) -> bool {
    match (backup, source) {
        (Some(backup), Some(source)) => backup >= source,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

async fn modified_time(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|m| m.modified().ok())
}
