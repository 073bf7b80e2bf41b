//! Local cache: the durable fallback for topics and message lists.
//!
//! DESIGN
//! ======
//! A tiny key/value seam (`KeyValueStore`) with an in-memory and an
//! on-disk implementation. `Persistence` layers the two chat keys on top:
//! `chatrooms` for the topic list and `messages_<topic id>` for each
//! topic's message list (oldest first).
//!
//! ERROR HANDLING
//! ==============
//! Writes are fire-and-forget and last-write-wins: a failed write is logged
//! and dropped, never surfaced. Reads treat missing and corrupt entries the
//! same way, as `None`, so a damaged cache degrades to an empty start.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::model::{Message, Topic};

const TOPICS_KEY: &str = "chatrooms";

fn messages_key(topic_id: &str) -> String {
    format!("messages_{topic_id}")
}

// =============================================================================
// KEY/VALUE STORE
// =============================================================================

/// Raw string key/value storage surviving reloads.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] if the backing storage cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Remove a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] if the backing storage cannot be modified.
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Process-local store. Lost on exit; used when no cache directory is set.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a cache directory.
    ///
    /// # Errors
    ///
    /// Returns an io error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Topic ids are user-derived; keep file names to a safe alphabet.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        // Write-then-rename: readers never observe a torn file.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Typed chat cache on top of a [`KeyValueStore`]. Cheap to clone.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
}

impl fmt::Debug for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Cache backed by a [`MemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn save_topics(&self, topics: &[Topic]) {
        self.save_json(TOPICS_KEY, topics);
    }

    #[must_use]
    pub fn load_topics(&self) -> Option<Vec<Topic>> {
        self.load_json(TOPICS_KEY)
    }

    pub fn save_messages(&self, topic_id: &str, messages: &[Message]) {
        self.save_json(&messages_key(topic_id), messages);
    }

    #[must_use]
    pub fn load_messages(&self, topic_id: &str) -> Option<Vec<Message>> {
        self.load_json(&messages_key(topic_id))
    }

    pub fn clear_messages(&self, topic_id: &str) {
        let key = messages_key(topic_id);
        if let Err(e) = self.store.remove(&key) {
            warn!(error = %e, key = %key, "cache remove failed");
        }
    }

    fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, key, "cache serialize failed");
                return;
            }
        };
        if let Err(e) = self.store.set(key, &raw) {
            warn!(error = %e, key, "cache write failed");
        }
    }

    fn load_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(error = %e, key, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, key, "cache entry corrupt; ignoring");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
