//! Persistent key-value storage.
//!
//! The engine persists the credential and a cached user record so a reload
//! can rehydrate the session. Other tabs of the same origin share the store;
//! [`KeyValueStore::subscribe_external`] is how one tab learns that another
//! one logged in or out.
//!
//! # Implementations
//!
//! - [`SharedStorage`] / [`TabStorage`] - in-memory, origin-wide, with
//!   per-tab change feeds
//! - [`FileStore`] - JSON file on disk, for the CLI

mod file;
mod memory;

pub use file::FileStore;
pub use memory::{SharedStorage, TabId, TabStorage};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::broadcast;

/// Keys written to the persistent store.
pub mod keys {
    /// Opaque bearer credential.
    pub const CREDENTIAL: &str = "credential";

    /// Serialized [`User`](cartwheel_core::User) from the last verification.
    pub const CACHED_USER: &str = "cachedUser";

    /// Email to prefill on the login form.
    pub const REMEMBERED_EMAIL: &str = "rememberedEmail";

    /// Whether the user ticked "remember me".
    pub const REMEMBER_ME: &str = "rememberMeFlag";
}

/// A change to one key, as observed by a tab that did not make it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// The key that changed.
    pub key: String,
    /// Value before the write.
    pub old_value: Option<String>,
    /// Value after the write; `None` when the key was removed.
    pub new_value: Option<String>,
}

/// Errors writing to a persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be (de)serialized.
    #[error("storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable local storage shared by every tab of the origin.
///
/// No locking across tabs: last writer wins. Writes that leave a value
/// unchanged must not produce a [`StorageChange`].
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the value could not be persisted.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value. Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the removal could not be persisted.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Changes made by other tabs, never by this handle.
    fn subscribe_external(&self) -> broadcast::Receiver<StorageChange>;
}

/// Read and decode a JSON value, dropping entries that no longer parse.
pub fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Discarding unreadable stored value");
            if let Err(e) = store.remove(key) {
                tracing::warn!(key, error = %e, "Failed to remove unreadable stored value");
            }
            None
        }
    }
}

/// Encode and write a JSON value.
///
/// # Errors
///
/// Returns `StoreError` if encoding or the write fails.
pub fn write_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cartwheel_core::{User, UserId, UserRole};

    use super::*;

    fn user() -> User {
        User {
            id: UserId::new("u1"),
            name: "Ann".to_string(),
            email: "ann@example.com".to_string(),
            role: UserRole::Customer,
            avatar_url: None,
        }
    }

    #[test]
    fn test_json_helpers_roundtrip() {
        let shared = SharedStorage::new();
        let tab = shared.open_tab();

        write_json(&tab, keys::CACHED_USER, &user()).unwrap();
        let back: Option<User> = read_json(&tab, keys::CACHED_USER);
        assert_eq!(back, Some(user()));
    }

    #[test]
    fn test_read_json_discards_garbage() {
        let shared = SharedStorage::new();
        let tab = shared.open_tab();
        tab.set(keys::CACHED_USER, "{not json").unwrap();

        let back: Option<User> = read_json(&tab, keys::CACHED_USER);
        assert!(back.is_none());
        assert!(tab.get(keys::CACHED_USER).is_none());
    }
}
