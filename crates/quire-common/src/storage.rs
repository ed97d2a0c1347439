//! Local-only key/value storage.
//!
//! This is the only resource the sync engine reads and writes freely. Values
//! are JSON strings; writes are last-write-wins per key. Two backends:
//!
//! - [`MemoryStorage`]: a process-local map, for tests and ephemeral sessions
//! - [`FileStorage`]: one file per key in a directory, survives a restart

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use miette::Diagnostic;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors from a storage backend.
#[derive(Debug, thiserror::Error, Diagnostic)]
#[non_exhaustive]
pub enum StorageError {
    #[error("storage io failed for key {key}")]
    #[diagnostic(code(quire::storage::io))]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("value for key {key} is not valid JSON")]
    #[diagnostic(code(quire::storage::json))]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Synchronous key/value storage holding JSON strings.
pub trait LocalStorage: Send + Sync {
    /// Raw value for `key`, if present.
    fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set_raw(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Deserialize the value stored under `key`.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError>
    where
        Self: Sized,
    {
        let Some(raw) = self.get_raw(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Json {
                key: key.to_owned(),
                source,
            })
    }

    /// Serialize `value` as JSON and store it under `key`.
    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError>
    where
        Self: Sized,
    {
        let raw = serde_json::to_string(value).map_err(|source| StorageError::Json {
            key: key.to_owned(),
            source,
        })?;
        self.set_raw(key, raw)
    }
}

impl<S: LocalStorage + ?Sized> LocalStorage for std::sync::Arc<S> {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_raw(key)
    }

    fn set_raw(&self, key: &str, value: String) -> Result<(), StorageError> {
        (**self).set_raw(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl LocalStorage for MemoryStorage {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries().insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Directory-backed storage with one `.json` file per key.
///
/// Keys are escaped into file names, so any string is a valid key.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", escape_key(key)))
    }
}

impl LocalStorage for FileStorage {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_owned(),
                source,
            }),
        }
    }

    fn set_raw(&self, key: &str, value: String) -> Result<(), StorageError> {
        // Write to a sibling file first so a crash never leaves a torn value.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|source| StorageError::Io {
                key: key.to_owned(),
                source,
            })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_owned(),
                source,
            }),
        }
    }
}

/// Escape a key into a portable file name: `[A-Za-z0-9_-]` pass through,
/// every other byte becomes `%XX`.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        title: String,
        words: u32,
    }

    fn exercise(storage: &impl LocalStorage) {
        let entry = Entry {
            title: "Draft".into(),
            words: 12,
        };
        storage.set("doc:1", &entry).unwrap();
        storage.set_raw("doc:2", "{}".into()).unwrap();
        storage.set_raw("other", "1".into()).unwrap();

        assert_eq!(storage.get::<Entry>("doc:1").unwrap(), Some(entry));
        assert_eq!(storage.get::<Entry>("missing").unwrap(), None);
        assert_eq!(storage.get_raw("doc:2").unwrap().as_deref(), Some("{}"));

        // Last write wins.
        storage.set_raw("other", "2".into()).unwrap();
        assert_eq!(storage.get_raw("other").unwrap().as_deref(), Some("2"));

        storage.remove("doc:1").unwrap();
        storage.remove("doc:1").unwrap();
        assert_eq!(storage.get_raw("doc:1").unwrap(), None);
    }

    #[test]
    fn test_memory_storage() {
        exercise(&MemoryStorage::new());
    }

    #[test]
    fn test_file_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        exercise(&storage);

        // A fresh handle on the same directory sees the same data.
        let reopened = FileStorage::open(dir.path()).unwrap();
        assert_eq!(reopened.get_raw("other").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        let storage = MemoryStorage::new();
        storage.set_raw("doc:1", "not json".into()).unwrap();
        assert!(matches!(
            storage.get::<Entry>("doc:1"),
            Err(StorageError::Json { .. })
        ));
    }

    #[test]
    fn test_key_escaping() {
        assert_eq!(escape_key("doc:1"), "doc%3A1");
        assert_eq!(escape_key("offline_baseline:a/b"), "offline_baseline%3Aa%2Fb");
        assert_eq!(escape_key("é"), "%C3%A9");
    }
}
