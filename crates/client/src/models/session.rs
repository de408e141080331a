//! Session-related types.

use cartwheel_core::{Credential, User};

/// How much the engine trusts the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// No user.
    Anonymous,
    /// A cached user with no verified credential, restored only to avoid a
    /// "logged out" flash on reload. Reads are allowed; mutations are not.
    Stale,
    /// A user and the credential the backend verified for them.
    Verified,
}

/// The client's belief about who is logged in.
///
/// `is_authenticated()` is exactly `user().is_some()`. A credential is never
/// held without a user. `generation` increases on every change, so work
/// started under one session can tell that it finished under another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    credential: Option<Credential>,
    user: Option<User>,
    generation: u64,
}

impl Session {
    /// Bearer credential, if any.
    #[must_use]
    pub const fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Authenticated user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Whether a user is present (verified or stale).
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Monotonic change counter.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Trust level of this session.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        match (&self.user, &self.credential) {
            (None, _) => SessionStatus::Anonymous,
            (Some(_), None) => SessionStatus::Stale,
            (Some(_), Some(_)) => SessionStatus::Verified,
        }
    }

    /// Credential plus generation, for verified sessions only.
    #[must_use]
    pub fn ticket(&self) -> Option<SessionTicket> {
        match (&self.user, &self.credential) {
            (Some(_), Some(credential)) => Some(SessionTicket {
                credential: credential.clone(),
                generation: self.generation,
            }),
            _ => None,
        }
    }

    /// Replace identity. Returns `false` (and keeps the generation) when
    /// nothing changed.
    pub(crate) fn replace(&mut self, credential: Option<Credential>, user: Option<User>) -> bool {
        let credential = if user.is_some() { credential } else { None };
        if self.credential == credential && self.user == user {
            return false;
        }
        self.credential = credential;
        self.user = user;
        self.generation += 1;
        true
    }
}

/// Proof that an operation was issued under a verified session.
///
/// Results are only allowed to invalidate the session that issued them.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    credential: Credential,
    generation: u64,
}

impl SessionTicket {
    /// Credential to send with the request.
    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Generation of the issuing session.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}
