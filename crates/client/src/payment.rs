//! Payment gateway seam.
//!
//! The gateway captures card details and confirms payment intents created
//! by the backend. Its internals are out of scope: the engine only needs
//! [`PaymentGateway::confirm_card_payment`].

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::models::{Address, PersonalInfo};

/// Status of a payment intent after confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentStatus {
    Succeeded,
    Processing,
    RequiresAction,
    Canceled,
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Processing => write!(f, "processing"),
            Self::RequiresAction => write!(f, "requires_action"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// Errors reported by the payment gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The card was declined. The message is safe to show.
    #[error("Card declined: {0}")]
    Declined(String),

    /// Confirmation finished without capturing the payment.
    #[error("Payment not completed (status: {0})")]
    Incomplete(IntentStatus),

    /// The gateway could not be reached.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// Card details captured on the payment step.
///
/// Number and CVV are secrets; `Debug` never prints them.
#[derive(Clone)]
pub struct CardDetails {
    number: SecretString,
    pub expiry: String,
    cvv: SecretString,
    pub holder_name: String,
}

impl CardDetails {
    /// Capture card details from form input.
    #[must_use]
    pub fn new(number: &str, expiry: &str, cvv: &str, holder_name: &str) -> Self {
        Self {
            number: SecretString::from(number.to_owned()),
            expiry: expiry.trim().to_owned(),
            cvv: SecretString::from(cvv.trim().to_owned()),
            holder_name: holder_name.trim().to_owned(),
        }
    }

    /// Card number digits, without spaces or dashes.
    #[must_use]
    pub fn number_digits(&self) -> String {
        self.number
            .expose_secret()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect()
    }

    /// Card verification code.
    #[must_use]
    pub fn cvv(&self) -> &str {
        self.cvv.expose_secret()
    }

    /// Last four digits, for receipts and logs.
    #[must_use]
    pub fn last4(&self) -> String {
        let digits = self.number_digits();
        let skip = digits.chars().count().saturating_sub(4);
        digits.chars().skip(skip).collect()
    }
}

impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &format_args!("**** {}", self.last4()))
            .field("expiry", &self.expiry)
            .field("cvv", &"[REDACTED]")
            .field("holder_name", &self.holder_name)
            .finish()
    }
}

/// Billing details passed to the gateway with the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Address,
}

impl BillingDetails {
    /// Billing details from the checkout form.
    #[must_use]
    pub fn new(info: &PersonalInfo, address: &Address) -> Self {
        Self {
            name: info.full_name(),
            email: info.email.trim().to_owned(),
            phone: info.phone.trim().to_owned(),
            address: address.clone(),
        }
    }
}

/// Result of confirming an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedPayment {
    /// Gateway intent ID, bound to the order with `confirm-payment`.
    pub intent_id: String,
    pub status: IntentStatus,
}

/// External payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Confirm the intent identified by `client_secret` with the card.
    async fn confirm_card_payment(
        &self,
        client_secret: &SecretString,
        card: &CardDetails,
        billing: &BillingDetails,
    ) -> Result<ConfirmedPayment, GatewayError>;
}
