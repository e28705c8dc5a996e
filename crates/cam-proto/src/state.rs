//! Client-side key-value persistence.
//!
//! The control panel only remembers a handful of strings between runs (the
//! backend endpoint first of all). They live in one small JSON object on
//! disk, read once at startup and rewritten on every `set`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

/// Key under which the backend endpoint is stored.
pub const BACKEND_URL_KEY: &str = "backendUrl";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode client state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Minimal get/set store for persisted client state.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

type Entries = BTreeMap<String, String>;

fn lock(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Store backed by a JSON file, e.g. `~/.local/share/camdeck/client_state.json`.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Entries>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing or unreadable file yields an empty
    /// store; the file is (re)created on the first `set`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::load(&path);
        debug!("client state {:?}: {} entries", path, entries.len());
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Entries {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Entries::new(),
        };
        match serde_json::from_str::<Entries>(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("ignoring corrupt client state {:?}: {}", path, e);
                Entries::new()
            }
        }
    }

    fn save(&self, entries: &Entries) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json).map_err(io_err)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }
}

/// Volatile store that forgets everything on exit.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("client_state.json");

        let store = JsonFileStore::open(&path);
        assert_eq!(store.get(BACKEND_URL_KEY), None);
        store.set(BACKEND_URL_KEY, "http://cam.local:5000").unwrap();

        let reopened = JsonFileStore::open(&path);
        assert_eq!(
            reopened.get(BACKEND_URL_KEY).as_deref(),
            Some("http://cam.local:5000")
        );
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_state.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::open(&path);
        assert_eq!(store.get(BACKEND_URL_KEY), None);
        store.set(BACKEND_URL_KEY, "http://h").unwrap();
        assert_eq!(JsonFileStore::open(&path).get(BACKEND_URL_KEY).as_deref(), Some("http://h"));
    }

    #[test]
    fn test_memory_store_overwrites() {
        let store = MemoryStore::new();
        store.set("k", "a").unwrap();
        store.set("k", "b").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("b"));
    }
}
