//! Key/value backends for the policy store.
//!
//! Every component receives an `Arc<dyn KeyValueStore>` instead of reaching
//! for global preferences. Writes are per-key last-write-wins; there are no
//! cross-key transactions.
//!
//! `FileStore` is shared by the daemon, one-shot CLI commands and the watcher
//! process. Every mutation holds an exclusive lock on a sibling `.lock` file
//! while it re-reads the state file, applies its change and renames a fresh
//! copy into place, so concurrent writers never lose each other's keys.

use fs2::FileExt;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to persist state to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("state lock poisoned")]
    Poisoned,
}

/// Thread-safe string key/value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// Drop every key.
    fn clear(&self) -> Result<(), StoreError>;
    /// Pick up writes made by another process. No-op for purely in-memory
    /// backends.
    fn refresh(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-memory store, used by tests and the simulated platform.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries.write().map_err(|_| StoreError::Poisoned)?.clear();
        Ok(())
    }
}

/// File-backed store. The whole map lives in memory and is rewritten as a
/// JSON object on every mutation (temp file + rename, under the file lock).
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or create) the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = load(&path)?;
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `mutate` while holding the exclusive writer lock. The lock lives
    /// in its own file because the state file is replaced on every write.
    fn locked<T>(&self, mutate: impl FnOnce() -> Result<T, StoreError>) -> Result<T, StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.path.with_extension("json.lock"))
            .map_err(io_err)?;
        FileExt::lock_exclusive(&lock).map_err(io_err)?;
        let result = mutate();
        // Closing the handle releases the lock as well.
        let _ = FileExt::unlock(&lock);
        result
    }

    /// Other processes write the same file; start every mutation from its
    /// current contents so their keys survive. An unreadable file keeps the
    /// in-memory view.
    fn merge_from_disk(&self, entries: &mut HashMap<String, String>) {
        match load(&self.path) {
            Ok(fresh) => *entries = fresh,
            Err(e) => tracing::warn!(error = %e, "state file unreadable, writing from memory"),
        }
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Sorted output keeps the file diffable.
        let sorted: std::collections::BTreeMap<&String, &String> = entries.iter().collect();
        let json = serde_json::to_string_pretty(&sorted).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(json.as_bytes())?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|_| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }
        Ok(())
    }
}

fn load(path: &Path) -> Result<HashMap<String, String>, StoreError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let map: Map<String, Value> =
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            Value::Null => None,
            other => Some((k, other.to_string())),
        })
        .collect())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        self.locked(|| {
            self.merge_from_disk(&mut entries);
            entries.insert(key.to_string(), value);
            self.persist(&entries)
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        self.locked(|| {
            self.merge_from_disk(&mut entries);
            if entries.remove(key).is_some() {
                self.persist(&entries)?;
            }
            Ok(())
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        self.locked(|| {
            entries.clear();
            self.persist(&entries)
        })
    }

    fn refresh(&self) -> Result<(), StoreError> {
        let fresh = load(&self.path)?;
        *self.entries.lock().map_err(|_| StoreError::Poisoned)? = fresh;
        Ok(())
    }
}
