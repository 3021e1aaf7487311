//! Document identity and the live-document seam
//!
//! The editing host owns the documents. This module only describes what the
//! session engine needs to see of them: a stable id, the file backing them (if
//! any), whether they differ from that file, and a way to hear about edits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Extension used for backup files in the backup folder
pub const BACKUP_EXT: &str = "backup";

/// Width of the hex-encoded id in backup file names
const HEX_WIDTH: usize = 16;

/// Opaque identifier of an open document
///
/// Stable for the lifetime of the document and across a save/restore cycle.
/// Serialized as a plain integer in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl DocumentId {
    /// Generate a new id that does not collide with ids generated earlier in
    /// this process, and is unlikely to collide with ids from earlier runs.
    pub fn generate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);

        // Seed the counter from the clock on first use so ids from a previous
        // run (restored from the manifest) don't get handed out again.
        if NEXT.load(Ordering::Relaxed) == 0 {
            let seed = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(1)
                .max(1);
            let _ = NEXT.compare_exchange(0, seed, Ordering::SeqCst, Ordering::SeqCst);
        }
        Self(NEXT.fetch_add(1, Ordering::SeqCst))
    }

    /// Backup file name for this document: fixed-width hex plus extension
    pub fn backup_name(&self) -> String {
        format!("{:0width$x}.{BACKUP_EXT}", self.0, width = HEX_WIDTH)
    }

    /// Parse a backup file name back into the id it was derived from
    ///
    /// Returns `None` for anything that isn't exactly a backup name, so stray
    /// files in the backup folder are never mistaken for backups.
    pub fn from_backup_name(name: &str) -> Option<Self> {
        let hex = name.strip_suffix(BACKUP_EXT)?.strip_suffix('.')?;
        if hex.len() != HEX_WIDTH || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        if hex.bytes().any(|b| b.is_ascii_uppercase()) {
            return None;
        }
        u64::from_str_radix(hex, 16).ok().map(Self)
    }

    /// Hex form used as a key in on-disk maps
    pub fn to_hex(&self) -> String {
        format!("{:0width$x}", self.0, width = HEX_WIDTH)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc-{:x}", self.0)
    }
}

/// Callback invoked by the host on every content mutation of a document
pub type ChangeHook = Box<dyn Fn() + Send + Sync>;

/// An open document, as seen by the session engine
///
/// Implemented by the editing host. Everything except `replace_content` is
/// read-only from the engine's perspective; `replace_content` is only used
/// during restore to adopt newer backup content.
pub trait LiveDocument: Send + Sync {
    /// Stable identifier
    fn id(&self) -> DocumentId;

    /// Path of the file backing this document, `None` for untitled documents
    fn source_file(&self) -> Option<PathBuf>;

    /// Whether the in-memory content differs from the source file
    fn has_unsaved_changes(&self) -> bool;

    /// Snapshot of the current in-memory content
    fn content(&self) -> String;

    /// Replace the in-memory content (used when adopting a backup)
    fn replace_content(&self, content: String);

    /// Subscribe to content mutations
    ///
    /// The hook must run before the mutation is visible to other components.
    fn subscribe_changes(&self, hook: ChangeHook);
}

/// Shared handle to a host-owned document
pub type DocumentHandle = Arc<dyn LiveDocument>;
