//! Editing host seam
//!
//! The session engine never renders, decodes or lists documents itself. It
//! asks the host application through this trait.

use crate::model::{DocumentHandle, DocumentId};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;

/// What a document should be opened from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenSource {
    /// Read and decode the given file
    File(PathBuf),
    /// Start from this text, with no file attached
    Content(String),
}

/// The application hosting the open documents
#[async_trait]
pub trait EditingHost: Send + Sync {
    /// Open a document under the given id
    ///
    /// `untitled` documents have no source file and count as unsaved.
    async fn open_document(
        &self,
        source: OpenSource,
        id: DocumentId,
        untitled: bool,
    ) -> io::Result<DocumentHandle>;

    /// Documents currently open, in display order
    fn open_documents(&self) -> Vec<DocumentHandle>;

    /// Document that currently has focus
    fn selected_document(&self) -> Option<DocumentHandle>;

    /// Give focus to a document
    fn switch_to(&self, document: &DocumentHandle);
}
