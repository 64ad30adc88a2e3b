//! JSON-backed key/value store with per-entry versions
//!
//! The persisted document is read lazily on first access and written back
//! only by [`CacheStore::flush`]. A missing or unreadable document is
//! treated as an empty store.

use crate::error::{ModcacheError, ModcacheResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A single cached value and the version it was stored under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: String,
    pub value: Value,
}

/// On-disk representation of a store: `{ key: { version, value } }`
///
/// Ordered so that flushing the same contents always yields the same bytes.
pub type CacheDocument = BTreeMap<String, CacheEntry>;

enum StoreState {
    Unloaded,
    Loaded(CacheDocument),
}

/// Versioned cache for one plugin
pub struct CacheStore {
    cache_dir: PathBuf,
    cache_file: PathBuf,
    state: Mutex<StoreState>,
}

impl CacheStore {
    /// Create a store persisted at `{cache_dir}/{name}.json`
    pub fn new(cache_dir: impl Into<PathBuf>, name: &str) -> Self {
        let cache_dir = cache_dir.into();
        let cache_file = cache_dir.join(format!("{}.json", file_stem(name)));
        Self {
            cache_dir,
            cache_file,
            state: Mutex::new(StoreState::Unloaded),
        }
    }

    /// Path of the persisted document
    pub fn path(&self) -> &Path {
        &self.cache_file
    }

    /// Look up `key`, returning `None` if it is absent or was stored under
    /// a different version.
    pub async fn get(&self, key: &str, version: &str) -> Option<Value> {
        self.with_document(|document| match document.get(key) {
            Some(entry) if entry.version == version => Some(entry.value.clone()),
            Some(_) => {
                debug!("Cache version mismatch for {}", key);
                None
            }
            None => None,
        })
        .await
    }

    /// Typed variant of [`get`](Self::get). A stored value that no longer
    /// decodes as `T` counts as a miss.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str, version: &str) -> Option<T> {
        let value = self.get(key, version).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Insert or replace the entry for `key`. Not persisted until flushed.
    pub async fn set(&self, key: &str, version: &str, value: Value) {
        self.with_document(|document| {
            document.insert(
                key.to_string(),
                CacheEntry {
                    version: version.to_string(),
                    value,
                },
            );
        })
        .await
    }

    /// Typed variant of [`set`](Self::set)
    pub async fn set_as<T: Serialize>(&self, key: &str, version: &str, value: &T) -> ModcacheResult<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, version, value).await;
        Ok(())
    }

    /// Number of entries currently held
    pub async fn len(&self) -> usize {
        self.with_document(|document| document.len()).await
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Write the whole store to disk, creating the cache directory if needed.
    ///
    /// Entries already on disk are kept when nothing was read or written yet.
    pub async fn flush(&self) -> ModcacheResult<()> {
        let (content, entries) = self
            .with_document(|document| (serde_json::to_vec(document), document.len()))
            .await;
        let content = content?;

        fs::create_dir_all(&self.cache_dir).await.map_err(|e| {
            ModcacheError::io(format!("creating cache directory {}", self.cache_dir.display()), e)
        })?;
        fs::write(&self.cache_file, content).await.map_err(|e| {
            ModcacheError::io(format!("writing cache file {}", self.cache_file.display()), e)
        })?;

        debug!(
            "Flushed {} cache entries to {}",
            entries,
            self.cache_file.display()
        );
        Ok(())
    }

    /// Run `f` on the in-memory document, reading it from disk on first use
    async fn with_document<R>(&self, f: impl FnOnce(&mut CacheDocument) -> R) -> R {
        let mut state = self.state.lock().await;
        let mut document = match std::mem::replace(&mut *state, StoreState::Unloaded) {
            StoreState::Loaded(document) => document,
            StoreState::Unloaded => read_document(&self.cache_file).await,
        };
        let result = f(&mut document);
        *state = StoreState::Loaded(document);
        result
    }
}

/// Read a persisted cache document, recovering to an empty document on any failure
pub async fn read_document(path: &Path) -> CacheDocument {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No cache file at {}", path.display());
            return CacheDocument::new();
        }
        Err(e) => {
            warn!("Ignoring unreadable cache file {}: {}", path.display(), e);
            return CacheDocument::new();
        }
    };

    serde_json::from_slice(&content).unwrap_or_else(|e| {
        warn!("Ignoring corrupt cache file {}: {}", path.display(), e);
        CacheDocument::new()
    })
}

/// Map a plugin name onto a file-name-safe stem
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}
