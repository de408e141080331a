//! In-memory storage shared between tabs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use uuid::Uuid;

use super::{KeyValueStore, StorageChange, StoreError};
use crate::lock;

/// Per-tab buffer of external changes before a slow subscriber lags.
const CHANGE_BUFFER: usize = 64;

/// Identifies one tab (one engine instance) of the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(Uuid);

impl TabId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Origin-wide storage. Open one [`TabStorage`] per tab.
#[derive(Clone)]
pub struct SharedStorage {
    inner: Arc<SharedInner>,
}

struct SharedInner {
    entries: Mutex<HashMap<String, String>>,
    tabs: Mutex<Vec<(TabId, broadcast::Sender<StorageChange>)>>,
}

impl SharedStorage {
    /// Create an empty origin store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SharedInner {
                entries: Mutex::new(HashMap::new()),
                tabs: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Open a handle for a new tab.
    #[must_use]
    pub fn open_tab(&self) -> TabStorage {
        let id = TabId::new();
        let (tx, _) = broadcast::channel(CHANGE_BUFFER);
        lock(&self.inner.tabs).push((id, tx.clone()));
        TabStorage {
            id,
            shared: self.clone(),
            external: tx,
        }
    }

    fn write(&self, origin: TabId, key: &str, value: Option<&str>) {
        let mut entries = lock(&self.inner.entries);
        let old_value = match value {
            Some(v) => entries.insert(key.to_owned(), v.to_owned()),
            None => entries.remove(key),
        };

        if old_value.as_deref() == value {
            return;
        }

        let change = StorageChange {
            key: key.to_owned(),
            old_value,
            new_value: value.map(str::to_owned),
        };

        for (tab, tx) in lock(&self.inner.tabs).iter() {
            if *tab != origin {
                // No receivers yet is fine: nobody is listening in that tab.
                let _ = tx.send(change.clone());
            }
        }
    }
}

impl Default for SharedStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// One tab's view of a [`SharedStorage`].
pub struct TabStorage {
    id: TabId,
    shared: SharedStorage,
    external: broadcast::Sender<StorageChange>,
}

impl TabStorage {
    /// This tab's identity.
    #[must_use]
    pub const fn id(&self) -> TabId {
        self.id
    }
}

impl Drop for TabStorage {
    fn drop(&mut self) {
        lock(&self.shared.inner.tabs).retain(|(tab, _)| *tab != self.id);
    }
}

impl KeyValueStore for TabStorage {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.shared.inner.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.shared.write(self.id, key, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.shared.write(self.id, key, None);
        Ok(())
    }

    fn subscribe_external(&self) -> broadcast::Receiver<StorageChange> {
        self.external.subscribe()
    }
}
