//! File access tokens
//!
//! Remembers which file each document was opened from so it can be reopened
//! on the next start. Tokens are keyed by document id and survive restarts.

use crate::model::DocumentId;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Grants and resolves access to a document's source file across restarts
#[async_trait]
pub trait FileAccess: Send + Sync {
    /// Remember `path` as the source file of `id`
    ///
    /// Registering an already-registered document is not an error.
    async fn register(&self, id: DocumentId, path: &Path) -> io::Result<()>;

    /// Source file of `id`, or `None` if there is none (untitled document,
    /// unknown id, or the file is gone)
    async fn resolve(&self, id: DocumentId) -> io::Result<Option<PathBuf>>;

    /// Drop tokens of documents not in `keep`
    async fn retain(&self, _keep: &HashSet<DocumentId>) -> io::Result<()> {
        Ok(())
    }
}

/// File access tokens persisted as a JSON map in one file
///
/// ```json
/// { "000000000000002a": "/home/user/notes.txt" }
/// ```
#[derive(Debug)]
pub struct FileAccessRegistry {
    path: PathBuf,
    // Loaded on first use
    tokens: Mutex<Option<BTreeMap<String, PathBuf>>>,
}

impl FileAccessRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            tokens: Mutex::new(None),
        }
    }

    async fn load(&self) -> BTreeMap<String, PathBuf> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable file access list {:?}: {}", self.path, e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!("Failed to read file access list {:?}: {}", self.path, e);
                BTreeMap::new()
            }
        }
    }

    async fn persist(&self, tokens: &BTreeMap<String, PathBuf>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(tokens).map_err(io::Error::other)?;
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, json.as_bytes()).await?;
        tokio::fs::rename(&temp_path, &self.path).await
    }
}

#[async_trait]
impl FileAccess for FileAccessRegistry {
    async fn register(&self, id: DocumentId, path: &Path) -> io::Result<()> {
        let mut guard = self.tokens.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        let Some(tokens) = guard.as_mut() else {
            return Ok(());
        };

        let key = id.to_hex();
        if tokens.get(&key).map(PathBuf::as_path) == Some(path) {
            return Ok(());
        }
        tokens.insert(key, path.to_path_buf());
        self.persist(tokens).await
    }

    async fn resolve(&self, id: DocumentId) -> io::Result<Option<PathBuf>> {
        let mut guard = self.tokens.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }

        let Some(path) = guard.as_ref().and_then(|t| t.get(&id.to_hex())).cloned() else {
            return Ok(None);
        };
        if tokio::fs::metadata(&path).await.is_err() {
            tracing::debug!("Source file of {} no longer exists: {:?}", id, path);
            return Ok(None);
        }
        Ok(Some(path))
    }

    async fn retain(&self, keep: &HashSet<DocumentId>) -> io::Result<()> {
        let mut guard = self.tokens.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        let Some(tokens) = guard.as_mut() else {
            return Ok(());
        };

        let keep: HashSet<String> = keep.iter().map(DocumentId::to_hex).collect();
        let before = tokens.len();
        tokens.retain(|key, _| keep.contains(key));
        if tokens.len() != before {
            self.persist(tokens).await?;
        }
        Ok(())
    }
}
