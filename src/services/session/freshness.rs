//! Freshness tracking
//!
//! A document is "fresh" when its most recent backup file is byte-for-byte
//! identical to its in-memory content. Fresh documents are skipped by the
//! backup cycle.
//!
//! The set is touched from three places: cycle completion, restore-time
//! adoption of backup content, and edit notifications fired by the host.
//! All of them go through one mutex. Each document also carries an edit
//! generation so a cycle that snapshotted content before an edit cannot mark
//! the document fresh after that edit.

use crate::model::{DocumentId, LiveDocument};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct FreshnessState {
    fresh: HashSet<DocumentId>,
    generations: HashMap<DocumentId, u64>,
    watched: HashSet<DocumentId>,
}

/// Synchronized set of documents whose backup matches their content
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct FreshnessTracker {
    state: Arc<Mutex<FreshnessState>>,
}

impl FreshnessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FreshnessState> {
        // A panicking hook must not take backups down with it
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_fresh(&self, id: DocumentId) -> bool {
        self.lock().fresh.contains(&id)
    }

    /// Current edit generation of a document
    ///
    /// Read this before snapshotting content and pass it to
    /// [`mark_fresh_if_unchanged`](Self::mark_fresh_if_unchanged).
    pub fn generation(&self, id: DocumentId) -> u64 {
        self.lock().generations.get(&id).copied().unwrap_or(0)
    }

    /// Mark a document fresh unconditionally
    ///
    /// Only valid when the caller itself just set the in-memory content to
    /// the backup content (restore adoption).
    pub fn mark_fresh(&self, id: DocumentId) {
        self.lock().fresh.insert(id);
    }

    /// Mark a document fresh if it has not been edited since `generation`
    ///
    /// Returns whether the document was marked.
    pub fn mark_fresh_if_unchanged(&self, id: DocumentId, generation: u64) -> bool {
        let mut state = self.lock();
        let current = state.generations.get(&id).copied().unwrap_or(0);
        if current != generation {
            tracing::trace!("{} edited during backup, leaving it stale", id);
            return false;
        }
        state.fresh.insert(id);
        true
    }

    /// Record a content mutation: the document is no longer fresh
    pub fn invalidate(&self, id: DocumentId) {
        let mut state = self.lock();
        *state.generations.entry(id).or_insert(0) += 1;
        if state.fresh.remove(&id) {
            tracing::trace!("{} is no longer fresh", id);
        }
    }

    /// Drop all knowledge of a document (call when it is closed)
    pub fn forget(&self, id: DocumentId) {
        let mut state = self.lock();
        state.fresh.remove(&id);
        state.generations.remove(&id);
        state.watched.remove(&id);
    }

    /// Attach the edit hook to a document, once per document
    pub fn watch(&self, document: &dyn LiveDocument) {
        let id = document.id();
        if !self.lock().watched.insert(id) {
            return;
        }

        let tracker = self.clone();
        document.subscribe_changes(Box::new(move || tracker.invalidate(id)));
    }

    pub fn is_watched(&self, id: DocumentId) -> bool {
        self.lock().watched.contains(&id)
    }

    /// Snapshot of the fresh set
    pub fn fresh_ids(&self) -> HashSet<DocumentId> {
        self.lock().fresh.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().fresh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().fresh.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChangeHook;
    use std::path::PathBuf;

    #[derive(Default)]
    struct HookDoc {
        hooks: Mutex<Vec<ChangeHook>>,
    }

    impl HookDoc {
        fn edit(&self) {
            for hook in self.hooks.lock().unwrap().iter() {
                hook();
            }
        }
    }

    impl LiveDocument for HookDoc {
        fn id(&self) -> DocumentId {
            DocumentId(1)
        }
        fn source_file(&self) -> Option<PathBuf> {
            None
        }
        fn has_unsaved_changes(&self) -> bool {
            true
        }
        fn content(&self) -> String {
            String::new()
        }
        fn replace_content(&self, _content: String) {}
        fn subscribe_changes(&self, hook: ChangeHook) {
            self.hooks.lock().unwrap().push(hook);
        }
    }

    #[test]
    fn test_invalidate_removes_fresh() {
        let tracker = FreshnessTracker::new();
        tracker.mark_fresh(DocumentId(1));
        assert!(tracker.is_fresh(DocumentId(1)));

        tracker.invalidate(DocumentId(1));
        assert!(!tracker.is_fresh(DocumentId(1)));
    }

    #[test]
    fn test_edit_between_snapshot_and_mark_wins() {
        let tracker = FreshnessTracker::new();
        let id = DocumentId(5);

        let generation = tracker.generation(id);
        // Edit lands while the backup is being written
        tracker.invalidate(id);

        assert!(!tracker.mark_fresh_if_unchanged(id, generation));
        assert!(!tracker.is_fresh(id));

        let generation = tracker.generation(id);
        assert!(tracker.mark_fresh_if_unchanged(id, generation));
        assert!(tracker.is_fresh(id));
    }

    #[test]
    fn test_watch_subscribes_once() {
        let tracker = FreshnessTracker::new();
        let doc = HookDoc::default();

        tracker.watch(&doc);
        tracker.watch(&doc);
        assert_eq!(doc.hooks.lock().unwrap().len(), 1);

        tracker.mark_fresh(DocumentId(1));
        doc.edit();
        assert!(!tracker.is_fresh(DocumentId(1)));
    }

    #[test]
    fn test_forget_clears_everything() {
        let tracker = FreshnessTracker::new();
        let doc = HookDoc::default();
        tracker.watch(&doc);
        tracker.mark_fresh(DocumentId(1));
        tracker.invalidate(DocumentId(1));

        tracker.forget(DocumentId(1));
        assert!(!tracker.is_watched(DocumentId(1)));
        assert_eq!(tracker.generation(DocumentId(1)), 0);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let tracker = FreshnessTracker::new();
        let other = tracker.clone();
        other.mark_fresh(DocumentId(3));
        assert!(tracker.is_fresh(DocumentId(3)));
        assert_eq!(tracker.len(), 1);
    }
}
