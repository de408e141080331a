//! In-process event bus with a bridge for cross-tab storage changes.
//!
//! Two transports feed the same stream:
//!
//! - in-process publishers (`SessionManager`, `CartEngine`, external-auth
//!   callbacks) call [`EventBus::publish`]
//! - [`EventBus::bridge`] forwards [`StorageChange`]s that other tabs made to
//!   the persistent store
//!
//! Consumers subscribe once and never special-case where an event came from.

use cartwheel_core::{Credential, User};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::storage::{KeyValueStore, StorageChange};

/// Events kept in the bus before slow subscribers start lagging.
const BUS_CAPACITY: usize = 256;

/// Ephemeral notifications. Never persisted.
#[derive(Debug, Clone)]
pub enum Event {
    /// The session was created, replaced or cleared.
    SessionChanged,
    /// A cart mutation settled or a fresh snapshot arrived.
    CartChanged,
    /// A flow outside the engine (e.g. an OAuth callback) already holds a
    /// verified user and credential.
    ExternalLogin {
        /// Verified user record.
        user: User,
        /// Credential issued alongside it.
        credential: Credential,
    },
    /// Another tab wrote to the persistent store.
    Storage(StorageChange),
}

impl Event {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SessionChanged => "session-changed",
            Self::CartChanged => "cart-changed",
            Self::ExternalLogin { .. } => "external-login",
            Self::Storage(_) => "storage",
        }
    }
}

/// Publish/subscribe channel shared by every component of one tab.
///
/// Cheap to clone; all clones publish into the same stream.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Publishing with no subscribers is not an error.
    pub fn publish(&self, event: Event) {
        tracing::debug!(event = event.name(), "Publishing event");
        let _ = self.tx.send(event);
    }

    /// Subscribe to every event published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Forward external changes of `store` into this bus.
    ///
    /// The task ends when the store's change feed closes.
    pub fn bridge(&self, store: &dyn KeyValueStore) -> JoinHandle<()> {
        let mut changes = store.subscribe_external();
        let bus = self.clone();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => bus.publish(Event::Storage(change)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Storage bridge lagged; changes were dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Storage bridge closed");
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
