//! Core data model
//!
//! Pure data structures with no I/O: document identity and the persisted
//! session manifest.

pub mod document;
pub mod manifest;

pub use document::{ChangeHook, DocumentHandle, DocumentId, LiveDocument};
pub use manifest::{DocumentEntry, SessionManifest};
