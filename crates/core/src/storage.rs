//! Persistent key-value storage backing the session
//!
//! The session core treats storage as synchronous and infallible from the
//! caller's point of view, the same way browser local storage behaves. Backends
//! log their own failures.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Key-value storage that survives restarts of the owning process
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-process storage, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Storage kept in a single JSON object on disk.
///
/// Every read goes back to the file, so a logout or refresh written by another
/// process sharing the same file is seen on the next access.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store backed by `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> BTreeMap<String, String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("Failed to read session file {}: {e}", self.path.display());
                return BTreeMap::new();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(
                "Ignoring corrupt session file {}: {e}",
                self.path.display()
            );
            BTreeMap::new()
        })
    }

    fn persist(&self, entries: &BTreeMap<String, String>) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create {}: {e}", parent.display());
                return;
            }
        }

        let content = match serde_json::to_string_pretty(entries) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to serialize session entries: {e}");
                return;
            }
        };

        // Write to a sibling file first so readers never see a torn document
        let tmp = self.path.with_extension("tmp");
        let result = fs::write(&tmp, content).and_then(|()| fs::rename(&tmp, &self.path));
        match result {
            Ok(()) => debug!("Persisted session file {}", self.path.display()),
            Err(e) => warn!("Failed to write session file {}: {e}", self.path.display()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load();
        apply(&mut entries);
        self.persist(&entries);
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.load().remove(key)
    }

    fn set(&self, key: &str, value: &str) {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        });
    }

    fn remove(&self, key: &str) {
        self.update(|entries| {
            entries.remove(key);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("token"), None);

        store.set("token", "abc");
        assert_eq!(store.get("token").as_deref(), Some("abc"));

        store.remove("token");
        assert_eq!(store.get("token"), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileStore::new(&path);
        store.set("token", "abc");
        store.set("refreshToken", "def");
        drop(store);

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("token").as_deref(), Some("abc"));
        assert_eq!(reopened.get("refreshToken").as_deref(), Some("def"));
    }

    #[test]
    fn test_file_store_sees_writes_from_other_handles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        let first = FileStore::new(&path);
        let second = FileStore::new(&path);

        first.set("token", "abc");
        assert_eq!(second.get("token").as_deref(), Some("abc"));

        second.remove("token");
        assert_eq!(first.get("token"), None);
    }

    #[test]
    fn test_file_store_tolerates_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        let store = FileStore::new(&path);
        assert_eq!(store.get("token"), None);

        store.set("token", "abc");
        assert_eq!(store.get("token").as_deref(), Some("abc"));
    }
}
