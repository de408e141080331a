//! Unified error handling with Sentry integration.
//!
//! Every public engine operation returns `Result<T, ClientError>`. The
//! variants follow what the user can do about them: log in, fix a field,
//! retry, or accept a soft warning.

use cartwheel_core::LineId;
use thiserror::Error;

use crate::api::ApiError;
use crate::payment::GatewayError;
use crate::services::checkout::{CheckoutError, ValidationErrors};

/// Engine-level error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No live credential. The login redirect has been scheduled.
    #[error("Authentication required")]
    AuthRequired,

    /// The backend rejected the credential. The session has been cleared.
    #[error("Session expired")]
    SessionExpired,

    /// Local form validation failed. Never reaches the network.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Transport or backend failure. Not retried automatically.
    #[error("Network error: {0}")]
    Network(#[source] ApiError),

    /// Refused locally: the line is already at its stock limit.
    #[error("Stock limit of {limit} reached for line {line_id}")]
    StockLimitExceeded {
        /// Line that was refused.
        line_id: LineId,
        /// Stock available for the line.
        limit: u32,
    },

    /// The payment gateway did not capture the payment.
    #[error("Payment error: {0}")]
    Payment(#[from] GatewayError),

    /// Another operation on this line is still in flight.
    #[error("Line {0} is busy")]
    LineBusy(LineId),

    /// The line is not in the current cart snapshot.
    #[error("Unknown cart line: {0}")]
    UnknownLine(LineId),

    /// Quantities start at 1.
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    /// The backend refused the request with a user-facing message.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The checkout flow refused the transition.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),
}

impl ClientError {
    /// Soft warnings are shown but do not indicate a failure.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self, Self::StockLimitExceeded { .. })
    }

    /// Message safe to show in the UI.
    ///
    /// Transport details stay in logs and Sentry.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthRequired => "Please log in to continue.".to_string(),
            Self::SessionExpired => "Your session has expired. Please log in again.".to_string(),
            Self::Validation(errors) => errors.to_string(),
            Self::Network(_) => "Could not reach the store. Please try again.".to_string(),
            Self::StockLimitExceeded { limit, .. } => {
                format!("Only {limit} in stock.")
            }
            Self::Payment(err) => match err {
                GatewayError::Declined(reason) => format!("Payment declined: {reason}"),
                GatewayError::Incomplete(_) => {
                    "Payment was not completed. Your order is saved; you can try again."
                        .to_string()
                }
                GatewayError::Unavailable(_) => {
                    "Payment service unavailable. Your order is saved; you can try again."
                        .to_string()
                }
            },
            Self::LineBusy(_) => "This item is already being updated.".to_string(),
            Self::UnknownLine(_) => "This item is no longer in your cart.".to_string(),
            Self::InvalidQuantity => "Quantity must be at least 1.".to_string(),
            Self::Rejected(message) => message.clone(),
            Self::Checkout(err) => err.user_message().to_string(),
        }
    }

    /// Capture failures worth investigating to Sentry.
    ///
    /// Auth, validation and stock warnings are expected traffic and are not
    /// reported.
    pub fn report(&self) {
        if matches!(self, Self::Network(_) | Self::Payment(_)) {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront operation failed"
            );
        }
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Increased quantity", Some(&[("line_id", "64f0")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::IntentStatus;

    #[test]
    fn test_client_error_display() {
        let err = ClientError::UnknownLine(LineId::new("l1"));
        assert_eq!(err.to_string(), "Unknown cart line: l1");

        let err = ClientError::StockLimitExceeded {
            line_id: LineId::new("l1"),
            limit: 3,
        };
        assert_eq!(err.to_string(), "Stock limit of 3 reached for line l1");
    }

    #[test]
    fn test_user_message_hides_transport_details() {
        let err = ClientError::Network(ApiError::Status {
            status: 502,
            message: "upstream connect error at 10.0.0.7:5000".to_string(),
        });
        let message = err.user_message();
        assert!(!message.contains("10.0.0.7"));
        assert!(!message.contains("502"));
    }

    #[test]
    fn test_user_message_passes_backend_rejections_through() {
        let err = ClientError::Rejected("Product is out of stock".to_string());
        assert_eq!(err.user_message(), "Product is out of stock");
    }

    #[test]
    fn test_payment_messages_mention_saved_order() {
        let err = ClientError::Payment(GatewayError::Incomplete(IntentStatus::RequiresAction));
        assert!(err.user_message().contains("order is saved"));
    }

    #[test]
    fn test_only_stock_limit_is_a_warning() {
        assert!(
            ClientError::StockLimitExceeded {
                line_id: LineId::new("l1"),
                limit: 1,
            }
            .is_warning()
        );
        assert!(!ClientError::AuthRequired.is_warning());
        assert!(!ClientError::InvalidQuantity.is_warning());
    }
}
