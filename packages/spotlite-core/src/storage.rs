//! Durable key-value persistence for session state.
//!
//! The auth session and the recently-played cache both survive restarts of
//! the embedding shell. [`SessionStore`] is the boundary trait; the shells
//! pick the backing: [`MemoryStore`] for tests and ephemeral sessions,
//! [`FileStore`] for anything that should survive a restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Key-value persistence boundary.
///
/// Mirrors the semantics of browser local storage: synchronous string
/// access, last write wins, no cross-device sync.
pub trait SessionStore: Send + Sync {
    /// Returns the stored value for `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, overwriting any previous value.
    fn set(&self, key: &str, value: &str);

    /// Removes `key` if present.
    fn remove(&self, key: &str);

    /// Removes every key. Used by the "factory reset" path.
    fn clear(&self);
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

/// File-backed store: one JSON object per store, written atomically.
///
/// The whole map is rewritten on every mutation. Session state is a handful
/// of short strings, so the simplicity wins over incremental writes.
pub struct FileStore {
    path: PathBuf,
    /// Cache of the file contents; the lock also serializes disk writes.
    cache: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Opens (or creates) a store at `path`.
    ///
    /// An unreadable or corrupt file is treated as empty rather than an
    /// error; the session can always be re-established by logging in again.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            cache: Mutex::new(cache),
        }
    }

    /// Writes the cache to disk using a temp file + rename.
    ///
    /// Must be called with the cache lock held. Write failures are logged,
    /// not propagated: a full disk must not take down the live session.
    fn persist(&self, cache: &HashMap<String, String>) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("[FileStore] Failed to create {}: {}", parent.display(), e);
                return;
            }
        }
        let temp_path = temp_path_for(&self.path);
        let contents = match serde_json::to_string_pretty(cache) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("[FileStore] Failed to serialize session state: {}", e);
                return;
            }
        };
        let result = std::fs::write(&temp_path, contents)
            .and_then(|_| std::fs::rename(&temp_path, &self.path));
        if let Err(e) = result {
            log::warn!(
                "[FileStore] Failed to persist {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut cache = self.cache.lock();
        cache.insert(key.to_string(), value.to_string());
        self.persist(&cache);
    }

    fn remove(&self, key: &str) {
        let mut cache = self.cache.lock();
        if cache.remove(key).is_some() {
            self.persist(&cache);
        }
    }

    fn clear(&self) {
        let mut cache = self.cache.lock();
        if !cache.is_empty() {
            cache.clear();
            self.persist(&cache);
        }
    }
}
