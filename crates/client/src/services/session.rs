//! Session State Manager.
//!
//! Owns the canonical [`Session`]: the credential and user record, their
//! persisted copies, and reactions to changes made by other tabs. Every
//! change publishes [`Event::SessionChanged`].
//!
//! All authentication failures, whatever detected them, end in
//! [`SessionManager::guard`]. It is the only place that clears a session
//! because the backend rejected it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cartwheel_core::{Credential, Email, User};
use secrecy::SecretString;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::api::{ApiError, StorefrontApi};
use crate::error::{ClientError, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::events::{Event, EventBus};
use crate::models::{Session, SessionStatus, SessionTicket};
use crate::navigation::LoginRedirect;
use crate::services::checkout::ValidationErrors;
use crate::storage::{KeyValueStore, keys, read_json, write_json};

/// Owner of the session for one tab.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: Arc<dyn StorefrontApi>,
    store: Arc<dyn KeyValueStore>,
    bus: EventBus,
    redirect: LoginRedirect,
    state: watch::Sender<Session>,
    /// Bumped whenever a verification starts or is made obsolete.
    verification: AtomicU64,
}

impl SessionManager {
    /// Create a manager with an anonymous session. Call
    /// [`initialize`](Self::initialize) to rehydrate.
    #[must_use]
    pub fn new(
        api: Arc<dyn StorefrontApi>,
        store: Arc<dyn KeyValueStore>,
        bus: EventBus,
        redirect: LoginRedirect,
    ) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            inner: Arc::new(SessionInner {
                api,
                store,
                bus,
                redirect,
                state,
                verification: AtomicU64::new(0),
            }),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current session.
    #[must_use]
    pub fn session(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// Current trust level.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.state.borrow().status()
    }

    /// Current user, verified or stale.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    /// Watch the session. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Ticket for a read on behalf of a verified session, if any.
    #[must_use]
    pub fn ticket(&self) -> Option<SessionTicket> {
        self.inner.state.borrow().ticket()
    }

    /// Whether `ticket` was issued by the current session.
    #[must_use]
    pub fn is_current(&self, ticket: &SessionTicket) -> bool {
        self.inner.state.borrow().generation() == ticket.generation()
    }

    /// Ticket for a mutation.
    ///
    /// Stale and anonymous sessions get [`ClientError::AuthRequired`], and
    /// the login redirect is scheduled.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AuthRequired` without a verified credential.
    pub fn require_credential(&self) -> Result<SessionTicket, ClientError> {
        self.ticket().ok_or_else(|| {
            tracing::info!(status = ?self.status(), "Operation requires login");
            self.inner.redirect.schedule();
            ClientError::AuthRequired
        })
    }

    /// Email saved by "remember me", for the login form.
    #[must_use]
    pub fn remembered_email(&self) -> Option<String> {
        let remember = self.inner.store.get(keys::REMEMBER_ME);
        if remember.as_deref() != Some("true") {
            return None;
        }
        self.inner.store.get(keys::REMEMBERED_EMAIL)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Rehydrate from the persistent store.
    ///
    /// A stored credential is verified with the backend. Without one, a
    /// cached user is restored as a [`SessionStatus::Stale`] session.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> SessionStatus {
        let credential = self
            .inner
            .store
            .get(keys::CREDENTIAL)
            .and_then(|raw| Credential::parse(&raw));

        if let Some(credential) = credential {
            self.verify(credential).await;
        } else if let Some(user) = read_json::<User>(self.inner.store.as_ref(), keys::CACHED_USER) {
            tracing::debug!(user_id = %user.id, "Restoring cached user without credential");
            self.replace(None, Some(user));
        } else {
            self.replace(None, None);
        }

        self.status()
    }

    /// Log in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a malformed email (no request is
    /// sent), `ClientError::Rejected` for wrong credentials, and
    /// `ClientError::Network` for transport failures.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
        remember_me: bool,
    ) -> Result<User, ClientError> {
        let email = Email::parse(email)
            .map_err(|e| ClientError::Validation(ValidationErrors::single("email", e.to_string())))?;

        let payload = match self.inner.api.login(&email, password).await {
            Ok(payload) => payload,
            Err(ApiError::Unauthorized) => {
                return Err(ClientError::Rejected("Invalid email or password".to_string()));
            }
            Err(ApiError::Rejected(message)) => return Err(ClientError::Rejected(message)),
            Err(e) => return Err(ClientError::Network(e)),
        };

        let credential = Credential::parse(&payload.token)
            .ok_or(ClientError::Network(ApiError::MissingData("token")))?;

        self.inner.verification.fetch_add(1, Ordering::SeqCst);
        self.persist(&credential, &payload.user);
        self.remember(remember_me.then_some(&email));
        self.replace(Some(credential), Some(payload.user.clone()));

        add_breadcrumb("auth", "Logged in", Some(&[("user_id", payload.user.id.as_str())]));
        tracing::info!(user_id = %payload.user.id, "Logged in");

        Ok(payload.user)
    }

    /// Adopt a user and credential verified elsewhere (e.g. an OAuth
    /// callback). No round trip.
    pub fn on_in_process_login(&self, user: User, credential: Credential) {
        self.inner.verification.fetch_add(1, Ordering::SeqCst);
        self.persist(&credential, &user);
        if self.replace(Some(credential), Some(user)) {
            tracing::info!("Session set by external login");
        }
    }

    /// React to another tab changing the stored credential.
    ///
    /// A new value is verified; removal clears the session without any
    /// network call. Repeated notifications are no-ops.
    #[instrument(skip(self, new_value))]
    pub async fn on_external_credential_change(&self, new_value: Option<&str>) {
        match new_value.and_then(Credential::parse) {
            Some(credential) => {
                if self.inner.state.borrow().credential() == Some(&credential) {
                    tracing::debug!("Credential unchanged; nothing to verify");
                    return;
                }
                self.verify(credential).await;
            }
            None => {
                self.inner.verification.fetch_add(1, Ordering::SeqCst);
                if self.replace(None, None) {
                    tracing::info!("Session cleared by another tab");
                }
            }
        }
    }

    /// Log out.
    ///
    /// The session and stored credential are cleared immediately. Clearing
    /// the server-side cart and the `logout` call run in the background;
    /// their failures are logged and never surfaced. Await the returned
    /// handle to wait for them.
    pub fn logout(&self) -> JoinHandle<()> {
        let credential = self.inner.state.borrow().credential().cloned();

        self.inner.verification.fetch_add(1, Ordering::SeqCst);
        self.clear_persisted();
        self.replace(None, None);
        add_breadcrumb("auth", "Logged out", None);

        let api = Arc::clone(&self.inner.api);
        tokio::spawn(async move {
            let Some(credential) = credential else {
                return;
            };
            if let Err(e) = api.clear_cart(&credential).await {
                tracing::warn!(error = %e, "Failed to clear server cart on logout");
            }
            if let Err(e) = api.logout(Some(&credential)).await {
                tracing::warn!(error = %e, "Backend logout failed");
            }
        })
    }

    // =========================================================================
    // Auth choke point
    // =========================================================================

    /// Map a backend result for a request issued with `ticket`.
    ///
    /// [`ApiError::Unauthorized`] expires the session (if it is still the one
    /// that issued the request) and becomes [`ClientError::SessionExpired`].
    ///
    /// # Errors
    ///
    /// Returns the mapped `ClientError` for any backend failure.
    pub fn guard<T>(
        &self,
        ticket: &SessionTicket,
        result: Result<T, ApiError>,
    ) -> Result<T, ClientError> {
        match result {
            Ok(value) => Ok(value),
            Err(ApiError::Unauthorized) => {
                if self.is_current(ticket) {
                    self.expire_session();
                } else {
                    tracing::debug!("Ignoring 401 from a previous session");
                }
                Err(ClientError::SessionExpired)
            }
            Err(ApiError::Rejected(message)) => Err(ClientError::Rejected(message)),
            Err(e) => Err(ClientError::Network(e)),
        }
    }

    /// Clear everything and send the user to the login surface.
    fn expire_session(&self) {
        tracing::warn!("Credential rejected; clearing session");
        self.inner.verification.fetch_add(1, Ordering::SeqCst);
        self.clear_persisted();
        self.replace(None, None);
        add_breadcrumb("auth", "Session expired", None);
        self.inner.redirect.schedule();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Verify `credential` and adopt or clear the session. Superseded
    /// results are dropped.
    async fn verify(&self, credential: Credential) {
        let attempt = self.inner.verification.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.inner.api.current_user(&credential).await;

        if self.inner.verification.load(Ordering::SeqCst) != attempt {
            tracing::debug!("Discarding superseded verification result");
            return;
        }

        match result {
            Ok(user) => {
                self.persist(&credential, &user);
                self.replace(Some(credential), Some(user));
            }
            Err(ApiError::Unauthorized) => self.expire_session(),
            Err(e) => {
                tracing::warn!(error = %e, "Credential verification failed; clearing session");
                self.clear_persisted();
                self.replace(None, None);
            }
        }
    }

    /// Swap identity and notify. Returns whether anything changed.
    fn replace(&self, credential: Option<Credential>, user: Option<User>) -> bool {
        let changed = self
            .inner
            .state
            .send_if_modified(|session| session.replace(credential, user));

        if changed {
            match self.inner.state.borrow().user() {
                Some(user) => set_sentry_user(&user.id, Some(&user.email)),
                None => clear_sentry_user(),
            }
            self.inner.bus.publish(Event::SessionChanged);
        }
        changed
    }

    fn persist(&self, credential: &Credential, user: &User) {
        let store = self.inner.store.as_ref();
        if let Err(e) = store.set(keys::CREDENTIAL, credential.expose()) {
            tracing::warn!(error = %e, "Failed to persist credential");
        }
        if let Err(e) = write_json(store, keys::CACHED_USER, user) {
            tracing::warn!(error = %e, "Failed to persist user");
        }
    }

    fn clear_persisted(&self) {
        for key in [keys::CREDENTIAL, keys::CACHED_USER] {
            if let Err(e) = self.inner.store.remove(key) {
                tracing::warn!(key, error = %e, "Failed to clear stored session value");
            }
        }
    }

    fn remember(&self, email: Option<&Email>) {
        let store = self.inner.store.as_ref();
        let result = match email {
            Some(email) => store
                .set(keys::REMEMBERED_EMAIL, email.as_str())
                .and_then(|()| store.set(keys::REMEMBER_ME, "true")),
            None => store
                .remove(keys::REMEMBERED_EMAIL)
                .and_then(|()| store.remove(keys::REMEMBER_ME)),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to update remembered email");
        }
    }
}
