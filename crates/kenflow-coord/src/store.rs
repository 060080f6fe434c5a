//! JSON key/value store for state that lives outside the backend.
//!
//! Every call re-reads the file so separate surfaces observe each other's
//! writes; `set` and `remove` are read-modify-write under one process lock.

use std::{
    fs, io,
    io::Write,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{Error, Result};

/// File-backed JSON object of named values.
#[derive(Debug)]
pub struct LocalStore {
    /// Backing file.
    path: PathBuf,
    /// Serializes read-modify-write cycles within the process.
    lock: Mutex<()>,
}

impl LocalStore {
    /// Store backed by `path`; the file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decoded value under `key`. Missing, unreadable and mistyped values all
    /// read as `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let _guard = self.lock.lock();
        let value = read_object(&self.path).remove(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(path = %self.path.display(), key, error = %e, "ignoring malformed value");
                None
            }
        }
    }

    /// Whether a value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        let _guard = self.lock.lock();
        read_object(&self.path).contains_key(key)
    }

    /// Store `value` under `key`, keeping every other key.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value).map_err(|e| Error::persistence(&self.path, e))?;
        let _guard = self.lock.lock();
        let mut obj = read_object(&self.path);
        obj.insert(key.to_string(), encoded);
        write_json_atomic(&self.path, &Value::Object(obj))?;
        debug!(key, "local state written");
        Ok(())
    }

    /// Drop `key`.
    pub fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut obj = read_object(&self.path);
        if obj.remove(key).is_some() {
            write_json_atomic(&self.path, &Value::Object(obj))?;
        }
        Ok(())
    }
}

/// Read `path` as a JSON object. A missing file is empty; a corrupt one is
/// logged and treated as empty.
pub(crate) fn read_object(path: &Path) -> Map<String, Value> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Map::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read local state");
            return Map::new();
        }
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(m)) => m,
        Ok(_) => {
            warn!(path = %path.display(), "local state is not an object; ignoring");
            Map::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt local state; ignoring");
            Map::new()
        }
    }
}

/// Write `value` to `path` through a temporary file in the same directory.
pub(crate) fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| Error::persistence(path, e))?;
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| Error::persistence(path, e))?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| Error::persistence(path, e))?;
    tmp.write_all(&bytes)
        .and_then(|()| tmp.flush())
        .map_err(|e| Error::persistence(path, e))?;
    tmp.persist(path).map_err(|e| Error::persistence(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path().join("state.json"));
        assert_eq!(store.get::<String>("theme"), None);

        store.set("theme", "light").expect("set");
        store.set("overlay_messages", &vec!["1", "2"]).expect("set");
        assert_eq!(store.get::<String>("theme").as_deref(), Some("light"));
        assert_eq!(
            store.get::<Vec<String>>("overlay_messages"),
            Some(vec!["1".to_string(), "2".to_string()])
        );

        store.remove("theme").expect("remove");
        assert!(!store.contains("theme"));
        assert!(store.contains("overlay_messages"));
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").expect("write");
        let store = LocalStore::new(&path);
        assert_eq!(store.get::<String>("theme"), None);
        store.set("theme", "dark").expect("set");
        assert_eq!(store.get::<String>("theme").as_deref(), Some("dark"));
    }

    #[test]
    fn mistyped_value_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path().join("state.json"));
        store.set("quick_access", &42).expect("set");
        assert_eq!(store.get::<Vec<String>>("quick_access"), None);
    }

    #[test]
    fn write_failure_is_a_persistence_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").expect("write");
        let store = LocalStore::new(blocker.join("state.json"));
        let err = store.set("theme", "dark").expect_err("parent is a file");
        assert!(matches!(err, Error::Persistence { .. }));
    }
}
