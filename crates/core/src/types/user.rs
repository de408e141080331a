//! Storefront user record.

use serde::{Deserialize, Serialize};

use crate::{UserId, UserRole};

/// The user record returned by the backend's "who am I" operation.
///
/// This is also the shape cached in local storage, so every field other than
/// the ID tolerates being absent: defaults are applied here, once, instead of
/// at each place that renders a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Backend user ID.
    #[serde(alias = "_id")]
    pub id: UserId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Email address as stored by the backend.
    #[serde(default)]
    pub email: String,
    /// Account role.
    #[serde(default)]
    pub role: UserRole,
    /// Avatar image URL.
    #[serde(default, alias = "avatar")]
    pub avatar_url: Option<String>,
}

impl User {
    /// Name to show in UI chrome, falling back to the email's local part.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.email.split('@').next().unwrap_or_default()
        } else {
            &self.name
        }
    }
}
