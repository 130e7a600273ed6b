//! File-backed config store
//!
//! A `LocalStore` is an in-memory key → map table overlaying one backing file.
//! Two instances exist per process: the long-lived backup mirror of the
//! coordination service, and the per-run session record of fetched keys.
//!
//! Every mutation holds the table lock across "mutate + encode + write", so
//! the file always reflects a committed in-memory state. Persistence is
//! best-effort: a failed write is logged at debug level and the in-memory
//! table stays authoritative for the rest of the process.

use crate::codec::{self, ConfigMap, Format};
use crate::store::lock::{self, DEFAULT_RETRIES};
use crate::store::{BackendKind, ConfigStore, StoreError};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Persistent key → config map table backed by a single file
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    format: Format,
    entries: Mutex<ConfigMap>,
    write_lock: Arc<Mutex<()>>,
}

impl LocalStore {
    /// Open the store at `path`, loading the file if it exists.
    ///
    /// The format follows the file suffix. A missing file starts an empty
    /// store; the file is created on the first persist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Format` for an unsupported suffix, a malformed
    /// file, or an entry whose value is not a mapping, and `StoreError::Io`
    /// if an existing file cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let format = Format::from_path(&path)?;

        let entries = if path.is_file() {
            let bytes = fs::read(&path).map_err(|e| StoreError::Io {
                path: path.clone(),
                source: e,
            })?;
            let entries = codec::decode(&bytes, format)?;
            validate_entries(&entries, &path)?;
            debug!("Loaded {} entries from {}", entries.len(), path.display());
            entries
        } else {
            ConfigMap::new()
        };

        let write_lock = lock::path_mutex(&path);
        Ok(Self {
            path,
            format,
            entries: Mutex::new(entries),
            write_lock,
        })
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialization format of the backing file.
    pub fn format(&self) -> Format {
        self.format
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock_entries().contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.lock_entries().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    /// Copy of the whole table, each value a mapping.
    pub fn snapshot(&self) -> ConfigMap {
        self.lock_entries().clone()
    }

    /// Upsert several entries and persist once.
    pub fn set_many<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, ConfigMap)>,
    {
        let mut table = self.lock_entries();
        let mut count = 0usize;
        for (key, value) in entries {
            table.insert(key, Value::Object(value));
            count += 1;
        }
        if count > 0 {
            self.write_table(&table);
            debug!("{count} entries updated in local config file {}", self.path.display());
        }
    }

    /// Write the full table to the backing file.
    ///
    /// Creates parent directories and the file itself if absent. Returns
    /// `false` if the write failed; the failure is logged, never raised.
    pub fn persist(&self) -> bool {
        let table = self.lock_entries();
        self.write_table(&table)
    }

    fn lock_entries(&self) -> MutexGuard<'_, ConfigMap> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_table(&self, table: &ConfigMap) -> bool {
        match self.try_write_table(table) {
            Ok(()) => {
                debug!("Updated local config file {}", self.path.display());
                true
            }
            Err(e) => {
                debug!("Could not update local config file {}: {e}", self.path.display());
                false
            }
        }
    }

    fn try_write_table(&self, table: &ConfigMap) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let _guard = lock::lock_for_write(&self.write_lock, &self.path, DEFAULT_RETRIES)?;
        let bytes = codec::encode(table, self.format)?;

        let tmp_path = self.path.with_extension(format!("{}.tmp", self.format.extension()));
        {
            let mut tmp_file = fs::File::create(&tmp_path)?;
            tmp_file.write_all(&bytes)?;
            tmp_file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    fn not_found(&self, key: &str) -> StoreError {
        StoreError::KeyNotFound {
            backend: BackendKind::LocalFile,
            key: key.to_string(),
            location: self.path.display().to_string(),
        }
    }
}

impl ConfigStore for LocalStore {
    fn get(&self, key: &str) -> Result<ConfigMap, StoreError> {
        debug!("Fetching {key} from local config file {}", self.path.display());
        match self.lock_entries().get(key) {
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(StoreError::format(format!(
                "{key} in {} is not a mapping",
                self.path.display()
            ))),
            None => Err(self.not_found(key)),
        }
    }

    fn set(&self, key: &str, value: ConfigMap) -> Result<(), StoreError> {
        let mut table = self.lock_entries();
        table.insert(key.to_string(), Value::Object(value));
        self.write_table(&table);
        debug!("{key} updated in local config file");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut table = self.lock_entries();
        if table.shift_remove(key).is_none() {
            return Err(self.not_found(key));
        }
        self.write_table(&table);
        debug!("{key} deleted from local config file");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum PersistError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Lock(#[from] lock::LockError),
    #[error(transparent)]
    Encode(#[from] StoreError),
}

fn validate_entries(entries: &ConfigMap, path: &Path) -> Result<(), StoreError> {
    match entries.iter().find(|(_, value)| !value.is_object()) {
        Some((key, _)) => Err(StoreError::format(format!(
            "entry {key} in {} is not a mapping",
            path.display()
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;
    use tempfile::TempDir;

    fn map(value: Value) -> ConfigMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_open_missing_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open(temp_dir.path().join("nested/zk_backup.yaml")).unwrap();
        assert!(store.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_open_rejects_unknown_suffix() {
        let temp_dir = TempDir::new().unwrap();
        let err = LocalStore::open(temp_dir.path().join("backup.txt")).unwrap_err();
        assert!(matches!(err, StoreError::Format { .. }));
    }

    #[test]
    fn test_set_creates_parent_dirs_and_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a/b/zk_backup.yaml");
        let store = LocalStore::open(&path).unwrap();

        store.set("/rigs/NP.1", map(json!({"Acq": "W10DT713843"}))).unwrap();

        assert!(path.exists());
        assert_eq!(store.get("/rigs/NP.1").unwrap()["Acq"], "W10DT713843");
    }

    #[test]
    fn test_durable_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("zk_backup.yaml");
        {
            let store = LocalStore::open(&path).unwrap();
            store.set("/b", map(json!({"y": 2}))).unwrap();
            store.set("/a", map(json!({"x": 1, "nested": {"k": [1, 2]}}))).unwrap();
        }

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.keys(), vec!["/b".to_string(), "/a".to_string()]);
        assert_eq!(reopened.get("/a").unwrap(), map(json!({"x": 1, "nested": {"k": [1, 2]}})));
    }

    #[test]
    fn test_json_backing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record.json");
        let store = LocalStore::open(&path).unwrap();
        store.set("/x", map(json!({"v": true}))).unwrap();

        let raw: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw, json!({"/x": {"v": true}}));
    }

    #[test]
    fn test_get_missing_names_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("zk_backup.yaml");
        let store = LocalStore::open(&path).unwrap();

        let err = store.get("/missing").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("zk_backup.yaml"), "{err}");
    }

    #[test]
    fn test_delete_missing_leaves_store_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("zk_backup.yaml");
        let store = LocalStore::open(&path).unwrap();
        store.set("/a", map(json!({"x": 1}))).unwrap();
        let before = fs::read(&path).unwrap();

        let err = store.delete("/nope").unwrap_err();
        assert!(matches!(
            err,
            StoreError::KeyNotFound {
                backend: BackendKind::LocalFile,
                ..
            }
        ));
        assert_eq!(store.keys(), vec!["/a".to_string()]);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_delete_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("zk_backup.yaml");
        let store = LocalStore::open(&path).unwrap();
        store.set("/a", map(json!({"x": 1}))).unwrap();
        store.set("/b", map(json!({"y": 2}))).unwrap();

        store.delete("/a").unwrap();

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.keys(), vec!["/b".to_string()]);
    }

    #[test]
    fn test_persist_failure_keeps_memory_state() {
        let temp_dir = TempDir::new().unwrap();
        // Parent "directory" is a regular file, so every write fails.
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let store = LocalStore::open(blocker.join("zk_backup.yaml")).unwrap();

        store.set("/a", map(json!({"x": 1}))).unwrap();

        assert!(!store.persist());
        assert_eq!(store.get("/a").unwrap(), map(json!({"x": 1})));
    }

    #[test]
    fn test_open_rejects_non_mapping_entry() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("zk_backup.yaml");
        fs::write(&path, "/a:\n  x: 1\n/b: 3\n").unwrap();
        assert!(matches!(LocalStore::open(&path), Err(StoreError::Format { .. })));
    }

    #[test]
    fn test_set_many_persists_once_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("zk_backup.yaml");
        let store = LocalStore::open(&path).unwrap();

        store.set_many(vec![
            ("/z".to_string(), map(json!({"n": 1}))),
            ("/m".to_string(), map(json!({"n": 2}))),
        ]);

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.keys(), vec!["/z".to_string(), "/m".to_string()]);
    }

    #[test]
    fn test_concurrent_writers_all_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("zk_backup.yaml");
        let store = Arc::new(LocalStore::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.set(&format!("/k{i}"), map(json!({"i": i}))).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 8);
        for i in 0..8 {
            assert_eq!(reopened.get(&format!("/k{i}")).unwrap()["i"], i);
        }
    }
}
