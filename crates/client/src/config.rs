//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CARTWHEEL_API_BASE_URL` - Base URL of the storefront backend API
//!
//! ## Optional
//! - `CARTWHEEL_CURRENCY` - Currency for payment intents (default: usd)
//! - `CARTWHEEL_LOGIN_REDIRECT_DELAY_MS` - Delay before redirecting to login (default: 1500)
//! - `CARTWHEEL_STORAGE_DIR` - Directory for the file-backed store (default: .cartwheel)
//! - `CARTWHEEL_COUPON_CACHE_TTL_SECS` - Coupon lookup cache TTL (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use cartwheel_core::CurrencyCode;
use thiserror::Error;
use url::Url;

const DEFAULT_LOGIN_REDIRECT_DELAY_MS: u64 = 1500;
const DEFAULT_COUPON_CACHE_TTL_SECS: u64 = 300;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Backend API base URL, always ending in `/`
    pub api_base_url: Url,
    /// Currency used when creating payment intents
    pub currency: CurrencyCode,
    /// How long an `AuthRequired` message stays up before the login redirect
    pub login_redirect_delay: Duration,
    /// Directory holding the file-backed key-value store
    pub storage_dir: PathBuf,
    /// How long resolved coupons stay cached
    pub coupon_cache_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("currency", &self.currency)
            .field("login_redirect_delay", &self.login_redirect_delay)
            .field("storage_dir", &self.storage_dir)
            .field("coupon_cache_ttl", &self.coupon_cache_ttl)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_environment", &self.sentry_environment)
            .finish()
    }
}

impl ClientConfig {
    /// Configuration with defaults for everything but the API base URL.
    #[must_use]
    pub fn new(api_base_url: Url) -> Self {
        Self {
            api_base_url: normalize_base_url(api_base_url),
            currency: CurrencyCode::default(),
            login_redirect_delay: Duration::from_millis(DEFAULT_LOGIN_REDIRECT_DELAY_MS),
            storage_dir: PathBuf::from(".cartwheel"),
            coupon_cache_ttl: Duration::from_secs(DEFAULT_COUPON_CACHE_TTL_SECS),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = parse_base_url(
            "CARTWHEEL_API_BASE_URL",
            &get_required_env("CARTWHEEL_API_BASE_URL")?,
        )?;
        let currency = get_env_or_default("CARTWHEEL_CURRENCY", "usd")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("CARTWHEEL_CURRENCY".to_string(), e))?;
        let login_redirect_delay = Duration::from_millis(parse_u64(
            "CARTWHEEL_LOGIN_REDIRECT_DELAY_MS",
            DEFAULT_LOGIN_REDIRECT_DELAY_MS,
        )?);
        let coupon_cache_ttl = Duration::from_secs(parse_u64(
            "CARTWHEEL_COUPON_CACHE_TTL_SECS",
            DEFAULT_COUPON_CACHE_TTL_SECS,
        )?);
        let storage_dir = PathBuf::from(get_env_or_default("CARTWHEEL_STORAGE_DIR", ".cartwheel"));

        Ok(Self {
            api_base_url,
            currency,
            login_redirect_delay,
            storage_dir,
            coupon_cache_ttl,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Parse and validate the backend base URL.
fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}' (expected http or https)", url.scheme()),
        ));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "URL must have a host".to_string(),
        ));
    }

    Ok(normalize_base_url(url))
}

/// Ensure the path ends in `/` so `Url::join` appends instead of replacing
/// the last segment.
fn normalize_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_url_adds_trailing_slash() {
        let url = parse_base_url("TEST", "https://shop.example.com/api").unwrap();
        assert_eq!(url.as_str(), "https://shop.example.com/api/");
        assert_eq!(
            url.join("cart-view").unwrap().as_str(),
            "https://shop.example.com/api/cart-view"
        );
    }

    #[test]
    fn test_parse_base_url_rejects_other_schemes() {
        let err = parse_base_url("TEST", "ftp://shop.example.com").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_parse_base_url_rejects_garbage() {
        assert!(parse_base_url("TEST", "not a url").is_err());
    }

    #[test]
    fn test_new_uses_defaults() {
        let config = ClientConfig::new(Url::parse("http://localhost:5000/api").unwrap());
        assert_eq!(config.api_base_url.as_str(), "http://localhost:5000/api/");
        assert_eq!(config.login_redirect_delay, Duration::from_millis(1500));
        assert_eq!(config.coupon_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.currency, CurrencyCode::USD);
    }

    #[test]
    fn test_debug_redacts_sentry_dsn() {
        let mut config = ClientConfig::new(Url::parse("http://localhost:5000/").unwrap());
        config.sentry_dsn = Some("https://abc@sentry.example.com/1".to_string());

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("abc@sentry"));
    }
}
