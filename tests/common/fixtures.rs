// Test doubles for the session engine seams

use async_trait::async_trait;
use fresh_session::config::SessionConfig;
use fresh_session::model::{ChangeHook, DocumentHandle, DocumentId, LiveDocument};
use fresh_session::services::file_access::FileAccess;
use fresh_session::services::host::{EditingHost, OpenSource};
use fresh_session::services::session::{
    BackupCycleEngine, BackupFile, BackupStore, FreshnessTracker, MemorySessionStore,
    RestoreEngine, SessionCodec, SessionParts, SessionStore,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

// ============================================================================
// Documents
// ============================================================================

/// In-memory document that behaves like a host buffer
pub struct FakeDocument {
    id: DocumentId,
    source: Option<PathBuf>,
    content: Mutex<String>,
    unsaved: AtomicBool,
    hooks: Mutex<Vec<ChangeHook>>,
}

impl FakeDocument {
    pub fn new(id: DocumentId, source: Option<PathBuf>, content: &str, unsaved: bool) -> Arc<Self> {
        Arc::new(Self {
            id,
            source,
            content: Mutex::new(content.to_string()),
            unsaved: AtomicBool::new(unsaved),
            hooks: Mutex::new(Vec::new()),
        })
    }

    /// Untitled document; always unsaved
    pub fn untitled(content: &str) -> Arc<Self> {
        Self::new(DocumentId::generate(), None, content, true)
    }

    /// Document backed by `path`, clean or with unsaved edits
    pub fn file_backed(path: &Path, content: &str, unsaved: bool) -> Arc<Self> {
        Self::new(
            DocumentId::generate(),
            Some(path.to_path_buf()),
            content,
            unsaved,
        )
    }

    /// Change the content the way a user edit would
    pub fn edit(&self, content: &str) {
        self.notify();
        *self.content.lock().unwrap() = content.to_string();
        self.unsaved.store(true, Ordering::SeqCst);
    }

    /// Pretend the host saved the document to its source file
    pub fn mark_saved(&self) {
        self.unsaved.store(false, Ordering::SeqCst);
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.lock().unwrap().len()
    }

    fn notify(&self) {
        for hook in self.hooks.lock().unwrap().iter() {
            hook();
        }
    }
}

impl LiveDocument for FakeDocument {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn source_file(&self) -> Option<PathBuf> {
        self.source.clone()
    }

    fn has_unsaved_changes(&self) -> bool {
        self.unsaved.load(Ordering::SeqCst)
    }

    fn content(&self) -> String {
        self.content.lock().unwrap().clone()
    }

    fn replace_content(&self, content: String) {
        self.notify();
        *self.content.lock().unwrap() = content;
        self.unsaved.store(true, Ordering::SeqCst);
    }

    fn subscribe_changes(&self, hook: ChangeHook) {
        self.hooks.lock().unwrap().push(hook);
    }
}

// ============================================================================
// Host
// ============================================================================

/// Editing host keeping its documents in a list
#[derive(Default)]
pub struct FakeHost {
    documents: Mutex<Vec<Arc<FakeDocument>>>,
    selected: Mutex<Option<DocumentId>>,
    switches: Mutex<Vec<DocumentId>>,
    listings: AtomicUsize,
    panic_on_list: AtomicBool,
    fail_open: Mutex<HashSet<DocumentId>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, document: Arc<FakeDocument>) {
        self.documents.lock().unwrap().push(document);
    }

    pub fn close(&self, id: DocumentId) {
        self.documents.lock().unwrap().retain(|d| d.id != id);
        let mut selected = self.selected.lock().unwrap();
        if *selected == Some(id) {
            *selected = None;
        }
    }

    pub fn select(&self, id: DocumentId) {
        *self.selected.lock().unwrap() = Some(id);
    }

    pub fn document(&self, id: DocumentId) -> Option<Arc<FakeDocument>> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    pub fn ids(&self) -> Vec<DocumentId> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect()
    }

    pub fn selected_id(&self) -> Option<DocumentId> {
        *self.selected.lock().unwrap()
    }

    /// Every `switch_to` call, in order
    pub fn switches(&self) -> Vec<DocumentId> {
        self.switches.lock().unwrap().clone()
    }

    /// How many times the document list was requested (once per cycle)
    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    pub fn set_panic_on_list(&self, panic: bool) {
        self.panic_on_list.store(panic, Ordering::SeqCst);
    }

    pub fn fail_open(&self, id: DocumentId) {
        self.fail_open.lock().unwrap().insert(id);
    }
}

#[async_trait]
impl EditingHost for FakeHost {
    async fn open_document(
        &self,
        source: OpenSource,
        id: DocumentId,
        untitled: bool,
    ) -> io::Result<DocumentHandle> {
        if self.fail_open.lock().unwrap().contains(&id) {
            return Err(io::Error::other("open refused"));
        }

        let document = match source {
            OpenSource::File(path) => {
                let content = tokio::fs::read_to_string(&path).await?;
                FakeDocument::new(id, Some(path), &content, false)
            }
            OpenSource::Content(content) => FakeDocument::new(id, None, &content, untitled),
        };
        self.add(document.clone());
        Ok(document)
    }

    fn open_documents(&self) -> Vec<DocumentHandle> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_list.load(Ordering::SeqCst) {
            panic!("host exploded while listing documents");
        }
        self.documents
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.clone() as DocumentHandle)
            .collect()
    }

    fn selected_document(&self) -> Option<DocumentHandle> {
        let id = self.selected_id()?;
        self.document(id).map(|d| d as DocumentHandle)
    }

    fn switch_to(&self, document: &DocumentHandle) {
        self.switches.lock().unwrap().push(document.id());
        self.select(document.id());
    }
}

// ============================================================================
// Storage
// ============================================================================

struct StoredBackup {
    content: Vec<u8>,
    modified: SystemTime,
}

/// Backup store kept in memory, with failure injection
pub struct MemoryBackupStore {
    dir: PathBuf,
    files: Mutex<BTreeMap<String, StoredBackup>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryBackupStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            dir: PathBuf::from("/memory/backups"),
            files: Mutex::new(BTreeMap::new()),
            writes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        })
    }

    /// Place a file in the store without counting it as a write
    pub fn insert(&self, name: &str, content: &str, modified: SystemTime) -> PathBuf {
        self.files.lock().unwrap().insert(
            name.to_string(),
            StoredBackup {
                content: content.as_bytes().to_vec(),
                modified,
            },
        );
        self.dir.join(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub fn content(&self, name: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .map(|f| String::from_utf8_lossy(&f.content).into_owned())
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn file(&self, name: &str, stored: &StoredBackup) -> BackupFile {
        BackupFile {
            name: name.to_string(),
            path: self.dir.join(name),
            modified: Some(stored.modified),
        }
    }
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write(&self, name: &str, content: &[u8]) -> io::Result<BackupFile> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("disk full"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        let stored = StoredBackup {
            content: content.to_vec(),
            modified: SystemTime::now(),
        };
        let file = self.file(name, &stored);
        self.files.lock().unwrap().insert(name.to_string(), stored);
        Ok(file)
    }

    async fn list(&self) -> io::Result<Vec<BackupFile>> {
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .map(|(name, stored)| self.file(name, stored))
            .collect())
    }

    async fn delete(&self, file: &BackupFile) -> io::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(io::Error::other("permission denied"));
        }
        self.files.lock().unwrap().remove(&file.name);
        Ok(())
    }

    async fn locate(&self, path: &Path) -> io::Result<Option<BackupFile>> {
        if path.parent() != Some(self.dir.as_path()) {
            return Ok(None);
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Ok(None);
        };
        let files = self.files.lock().unwrap();
        Ok(files.get(&name).map(|stored| self.file(&name, stored)))
    }

    async fn read(&self, file: &BackupFile) -> io::Result<String> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::other("unreadable backup"));
        }
        self.content(&file.name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such backup"))
    }
}

/// File access list kept in memory
#[derive(Default)]
pub struct MemoryFileAccess {
    tokens: Mutex<HashMap<DocumentId, PathBuf>>,
}

impl MemoryFileAccess {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, id: DocumentId) -> Option<PathBuf> {
        self.tokens.lock().unwrap().get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }
}

#[async_trait]
impl FileAccess for MemoryFileAccess {
    async fn register(&self, id: DocumentId, path: &Path) -> io::Result<()> {
        self.tokens.lock().unwrap().insert(id, path.to_path_buf());
        Ok(())
    }

    async fn resolve(&self, id: DocumentId) -> io::Result<Option<PathBuf>> {
        Ok(self.get(id).filter(|path| path.exists()))
    }

    async fn retain(&self, keep: &HashSet<DocumentId>) -> io::Result<()> {
        self.tokens.lock().unwrap().retain(|id, _| keep.contains(id));
        Ok(())
    }
}

/// Session store whose writes can be made to fail
#[derive(Default)]
pub struct FlakySessionStore {
    inner: MemorySessionStore,
    fail_sets: AtomicBool,
    sets: AtomicUsize,
}

impl FlakySessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for FlakySessionStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> io::Result<()> {
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(io::Error::other("store unavailable"));
        }
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        self.inner.remove(key).await
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// All in-memory collaborators of one session, shared by reference
pub struct TestRig {
    pub host: Arc<FakeHost>,
    pub backups: Arc<MemoryBackupStore>,
    pub file_access: Arc<MemoryFileAccess>,
    pub store: Arc<FlakySessionStore>,
    pub freshness: FreshnessTracker,
}

impl TestRig {
    pub fn new() -> Self {
        Self {
            host: FakeHost::new(),
            backups: MemoryBackupStore::new(),
            file_access: MemoryFileAccess::new(),
            store: FlakySessionStore::new(),
            freshness: FreshnessTracker::new(),
        }
    }

    /// Same storage, fresh host and tracker: what the next process sees
    pub fn restart(&self) -> Self {
        Self {
            host: FakeHost::new(),
            backups: self.backups.clone(),
            file_access: self.file_access.clone(),
            store: self.store.clone(),
            freshness: FreshnessTracker::new(),
        }
    }

    pub fn codec(&self) -> SessionCodec {
        SessionCodec::new(self.store.clone(), SessionConfig::default().session_key)
    }

    /// Cycle engine with backups already enabled
    pub fn cycle_engine(&self) -> BackupCycleEngine {
        let engine = BackupCycleEngine::new(
            self.host.clone(),
            self.file_access.clone(),
            self.backups.clone(),
            self.codec(),
            self.freshness.clone(),
        );
        engine.set_enabled(true);
        engine
    }

    pub fn restore_engine(&self) -> RestoreEngine {
        RestoreEngine::new(
            self.host.clone(),
            self.file_access.clone(),
            self.backups.clone(),
            self.freshness.clone(),
        )
    }

    pub fn parts(&self) -> SessionParts {
        SessionParts {
            host: self.host.clone(),
            file_access: self.file_access.clone(),
            backups: self.backups.clone(),
            store: self.store.clone(),
            lock: None,
        }
    }
}
