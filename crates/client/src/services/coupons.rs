//! Coupon lookup.
//!
//! Codes are validated by the backend. Resolved coupons are cached with
//! `moka` so re-applying a code while moving between checkout steps does not
//! cost a round trip. Entries are scoped to the session generation that
//! validated them, so a new login never sees another session's coupons.
//! Rejections are never cached.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument};

use crate::api::{StorefrontApi, ValidateCouponRequest};
use crate::error::ClientError;
use crate::models::{Coupon, normalize_code};
use crate::services::checkout::ValidationErrors;
use crate::services::session::SessionManager;

/// Resolves user-entered codes to coupons.
#[derive(Clone)]
pub struct CouponBook {
    inner: Arc<CouponBookInner>,
}

struct CouponBookInner {
    api: Arc<dyn StorefrontApi>,
    session: SessionManager,
    cache: Cache<(u64, String), Coupon>,
}

impl CouponBook {
    /// Create a coupon book whose entries live for `ttl`.
    #[must_use]
    pub fn new(api: Arc<dyn StorefrontApi>, session: SessionManager, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(256).time_to_live(ttl).build();

        Self {
            inner: Arc::new(CouponBookInner {
                api,
                session,
                cache,
            }),
        }
    }

    /// Look up a coupon by code.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a blank code,
    /// `ClientError::AuthRequired` without a verified session, and
    /// `ClientError::Rejected` for codes the backend does not accept.
    #[instrument(skip(self))]
    pub async fn resolve(&self, code: &str) -> Result<Coupon, ClientError> {
        let code = normalize_code(code).ok_or_else(|| {
            ClientError::Validation(ValidationErrors::single("coupon", "Enter a coupon code"))
        })?;

        let ticket = self.inner.session.require_credential()?;
        let key = (ticket.generation(), code.clone());

        if let Some(coupon) = self.inner.cache.get(&key).await {
            debug!(code = %code, "Cache hit for coupon");
            return Ok(coupon);
        }

        let result = self
            .inner
            .api
            .validate_coupon(ticket.credential(), &ValidateCouponRequest { code: code.clone() })
            .await;
        let mut coupon = self.inner.session.guard(&ticket, result)?;

        // The backend may echo the code in its own casing.
        coupon.code.clone_from(&code);
        self.inner.cache.insert(key, coupon.clone()).await;

        Ok(coupon)
    }

    /// Forget every cached coupon.
    ///
    /// Called on session changes; entries from an older generation can no
    /// longer be hit.
    pub fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
    }
}
