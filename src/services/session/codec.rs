//! Manifest persistence
//!
//! The manifest is stored as a single string value under one key of a
//! key-value session store. `SessionCodec` owns the encoding; stores only
//! move opaque strings around.

use super::error::{SessionError, SessionResult};
use crate::model::SessionManifest;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// String-valued key-value store holding the session
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> io::Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> io::Result<()>;

    /// Remove a key; removing a missing key is not an error
    async fn remove(&self, key: &str) -> io::Result<()>;
}

/// Session store backed by one JSON object file
///
/// The whole file is rewritten atomically on every change.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    // Serializes read-modify-write of the file
    write_lock: tokio::sync::Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> io::Result<BTreeMap<String, String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e),
        };
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    async fn write_all(&self, values: &BTreeMap<String, String>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(values).map_err(io::Error::other)?;
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, json.as_bytes()).await?;
        tokio::fs::rename(&temp_path, &self.path).await
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let _guard = self.write_lock.lock().await;
        // An unreadable store is replaced rather than wedging every later save
        let mut values = self.read_all().await.unwrap_or_else(|e| {
            tracing::warn!("Replacing unreadable session store {:?}: {}", self.path, e);
            BTreeMap::new()
        });
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values).await
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_all().await?;
        if values.remove(key).is_some() {
            self.write_all(&values).await?;
        }
        Ok(())
    }
}

/// In-memory session store
///
/// Useful for hosts that persist the session themselves, and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        self.values().remove(key);
        Ok(())
    }
}

/// Encodes the manifest and keeps it under one key of a session store
#[derive(Clone)]
pub struct SessionCodec {
    store: Arc<dyn SessionStore>,
    key: String,
}

impl SessionCodec {
    pub fn new(store: Arc<dyn SessionStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn encode(manifest: &SessionManifest) -> SessionResult<String> {
        Ok(serde_json::to_string(manifest)?)
    }

    pub fn decode(blob: &str) -> SessionResult<SessionManifest> {
        Ok(serde_json::from_str(blob)?)
    }

    /// Load the persisted manifest
    ///
    /// A missing key and an undecodable blob both mean "no previous session";
    /// neither is surfaced to the caller.
    pub async fn load(&self) -> Option<SessionManifest> {
        let blob = match self.store.get(&self.key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                tracing::debug!("No saved session under key {:?}", self.key);
                return None;
            }
            Err(e) => {
                tracing::debug!("Could not read saved session: {}", e);
                return None;
            }
        };

        match Self::decode(&blob) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::debug!("Ignoring undecodable saved session: {}", e);
                None
            }
        }
    }

    /// Encode and persist a manifest, replacing the previous one
    pub async fn save(&self, manifest: &SessionManifest) -> SessionResult<()> {
        let blob = Self::encode(manifest)?;
        self.store
            .set(&self.key, &blob)
            .await
            .map_err(|e| SessionError::Store(e.to_string()))
    }

    /// Remove the persisted manifest; backup files are left alone
    pub async fn clear(&self) -> SessionResult<()> {
        self.store
            .remove(&self.key)
            .await
            .map_err(|e| SessionError::Store(e.to_string()))
    }
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("store", &"<dyn SessionStore>")
            .field("key", &self.key)
            .finish()
    }
}
