//! File-backed store used by the CLI.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio::sync::broadcast;

use super::{KeyValueStore, StorageChange, StoreError};
use crate::lock;

const STORE_FILE: &str = "storage.json";

/// Key-value store persisted as one JSON object on disk.
///
/// Memory only changes once the file write succeeded.
///
/// A single process owns the file, so there is no external change feed:
/// [`KeyValueStore::subscribe_external`] returns a receiver that never yields.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
    external: broadcast::Sender<StorageChange>,
}

impl FileStore {
    /// Open (or create) the store in `dir`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the directory cannot be created or an existing
    /// store file cannot be read or parsed.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(STORE_FILE);

        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            BTreeMap::new()
        };

        let (external, _) = broadcast::channel(1);

        Ok(Self {
            path,
            entries: Mutex::new(entries),
            external,
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        if entries.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.insert(key.to_owned(), value.to_owned());
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn subscribe_external(&self) -> broadcast::Receiver<StorageChange> {
        self.external.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cartwheel-{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = temp_dir("reopen");
        {
            let store = FileStore::open(&dir).unwrap();
            store.set("credential", "tok").unwrap();
            store.set("rememberedEmail", "ann@example.com").unwrap();
            store.remove("rememberedEmail").unwrap();
        }

        let store = FileStore::open(&dir).unwrap();
        assert_eq!(store.get("credential").as_deref(), Some("tok"));
        assert!(store.get("rememberedEmail").is_none());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = temp_dir("corrupt");
        std::fs::write(dir.join(STORE_FILE), "[1, 2").unwrap();

        assert!(matches!(FileStore::open(&dir), Err(StoreError::Serialize(_))));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let dir = temp_dir("failed-write");
        let store = FileStore::open(&dir).unwrap();
        store.set("credential", "tok").unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert!(matches!(store.set("credential", "tok-2"), Err(StoreError::Io(_))));
        assert!(store.remove("credential").is_err());
        assert_eq!(store.get("credential").as_deref(), Some("tok"));

        std::fs::create_dir_all(&dir).unwrap();
        store.set("credential", "tok-2").unwrap();
        let reopened = FileStore::open(&dir).unwrap();
        assert_eq!(reopened.get("credential").as_deref(), Some("tok-2"));

        std::fs::remove_dir_all(dir).unwrap();
    }
}
