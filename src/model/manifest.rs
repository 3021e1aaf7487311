//! Session manifest data types
//!
//! The manifest is rebuilt from scratch on every backup cycle and replaces
//! the previously persisted one wholesale.

use super::document::DocumentId;
use serde::{Deserialize, Serialize};

/// Root persisted value describing the open session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionManifest {
    /// Document that had focus when the manifest was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_document: Option<DocumentId>,

    /// Documents in the order they were visited during the save
    #[serde(default)]
    pub documents: Vec<DocumentEntry>,
}

impl SessionManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Look up the entry for a document
    pub fn entry(&self, id: DocumentId) -> Option<&DocumentEntry> {
        self.documents.iter().find(|e| e.id == id)
    }

    /// Backup paths referenced by this manifest
    pub fn backup_paths(&self) -> impl Iterator<Item = &str> {
        self.documents
            .iter()
            .filter_map(|e| e.backup_path.as_deref())
    }
}

/// One open document in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntry {
    pub id: DocumentId,

    /// Present iff the document had unsaved changes when this entry was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
}

impl DocumentEntry {
    pub fn clean(id: DocumentId) -> Self {
        Self {
            id,
            backup_path: None,
        }
    }

    pub fn with_backup(id: DocumentId, backup_path: impl Into<String>) -> Self {
        Self {
            id,
            backup_path: Some(backup_path.into()),
        }
    }

    pub fn has_backup(&self) -> bool {
        self.backup_path.is_some()
    }
}
