//! Bearer credential issued by the storefront backend.

use secrecy::{ExposeSecret, SecretString};

/// An opaque bearer token presented on authenticated requests.
///
/// The token is held as a [`SecretString`] so it never shows up in `Debug`
/// output or tracing fields. Empty tokens are not credentials: use
/// [`Credential::parse`] when reading from untrusted places such as storage.
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    /// Wrap a token. Returns `None` for empty or whitespace-only values.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(Self(SecretString::from(token.to_owned())))
        }
    }

    /// Expose the raw token (for the `Authorization` header and storage).
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.expose())
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Credential {}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_empty() {
        assert!(Credential::parse("").is_none());
        assert!(Credential::parse("   ").is_none());
        assert!(Credential::parse("tok").is_some());
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = Credential::parse("super-secret-token").map(|c| format!("{c:?}"));
        let debug_output = credential.unwrap_or_default();
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super-secret-token"));
    }

    #[test]
    fn test_bearer_header() {
        let header = Credential::parse(" abc ").map(|c| c.bearer_header());
        assert_eq!(header.as_deref(), Some("Bearer abc"));
    }
}
