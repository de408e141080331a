//! Storefront backend API.
//!
//! # Architecture
//!
//! - [`StorefrontApi`] is the seam between the engine and the backend; the
//!   engine only ever talks to `Arc<dyn StorefrontApi>`
//! - [`HttpApi`] implements it over `reqwest` against the JSON envelope
//!   `{success, message?, data?}`
//! - Authenticated calls carry `Authorization: Bearer <credential>`
//!
//! No timeouts are set beyond the transport defaults, and nothing is retried.

mod http;

pub use http::HttpApi;

use async_trait::async_trait;
use cartwheel_core::{Credential, Email, LineId, OrderId, ProductId, User};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Address, Coupon, PaymentMethod, PlacedOrder, RawCartLine};

/// Backend operation paths, relative to the configured base URL.
pub mod endpoints {
    pub const CURRENT_USER: &str = "current-user";
    pub const LOGIN: &str = "login";
    pub const LOGOUT: &str = "logout";
    pub const CART_VIEW: &str = "cart-view";
    pub const ADD_TO_CART: &str = "add-to-cart";
    pub const UPDATE_CART: &str = "update-cart";
    pub const DELETE_CART_LINE: &str = "delete-cart-line";
    pub const CLEAR_CART: &str = "clear-cart";
    pub const CREATE_ORDER: &str = "create-order";
    pub const CREATE_PAYMENT_INTENT: &str = "create-payment-intent";
    pub const CONFIRM_PAYMENT: &str = "confirm-payment";
    pub const VALIDATE_COUPON: &str = "validate-coupon";
}

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The credential was rejected (HTTP 401).
    #[error("Unauthorized")]
    Unauthorized,

    /// The backend answered `success: false`.
    #[error("Rejected by backend: {0}")]
    Rejected(String),

    /// Non-success status without a usable envelope.
    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// `success: true` but a required part of `data` was missing.
    #[error("Response is missing {0}")]
    MissingData(&'static str),

    /// An endpoint path could not be joined to the base URL.
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

// =============================================================================
// Wire types
// =============================================================================

/// `POST login` body.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `POST login` response data.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    pub user: User,
    pub token: String,
}

/// `POST add-to-cart` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// `POST update-cart` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartRequest {
    pub line_id: LineId,
    pub quantity: u32,
}

/// `DELETE delete-cart-line` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCartLineRequest {
    pub line_id: LineId,
}

/// `POST create-order` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Buyer details attached to a payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// `POST create-payment-intent` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    /// Amount in the currency's minor unit.
    pub amount: i64,
    /// Lowercase ISO 4217 code.
    pub currency: String,
    pub order_id: OrderId,
    pub customer_info: CustomerInfo,
}

/// `POST create-payment-intent` response data.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    /// Secret the gateway needs to confirm the intent.
    #[serde(deserialize_with = "deserialize_secret")]
    pub client_secret: SecretString,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

impl std::fmt::Debug for PaymentIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentIntent")
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// `POST confirm-payment` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    pub payment_intent_id: String,
    pub order_id: OrderId,
}

/// `POST validate-coupon` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
}

// =============================================================================
// StorefrontApi
// =============================================================================

/// Operations the engine consumes from the storefront backend.
///
/// Every method maps one backend operation. A rejected credential must come
/// back as [`ApiError::Unauthorized`] so the session layer can handle it in
/// one place.
#[async_trait]
pub trait StorefrontApi: Send + Sync {
    /// `GET current-user`: verify a credential.
    async fn current_user(&self, credential: &Credential) -> Result<User, ApiError>;

    /// `POST login`: exchange email and password for a credential.
    async fn login(&self, email: &Email, password: &SecretString)
    -> Result<AuthPayload, ApiError>;

    /// `GET logout`.
    async fn logout(&self, credential: Option<&Credential>) -> Result<(), ApiError>;

    /// `GET cart-view`.
    async fn cart_view(&self, credential: &Credential) -> Result<Vec<RawCartLine>, ApiError>;

    /// `POST add-to-cart`.
    async fn add_to_cart(
        &self,
        credential: &Credential,
        request: &AddToCartRequest,
    ) -> Result<(), ApiError>;

    /// `POST update-cart`.
    async fn update_cart(
        &self,
        credential: &Credential,
        request: &UpdateCartRequest,
    ) -> Result<(), ApiError>;

    /// `DELETE delete-cart-line`.
    async fn delete_cart_line(
        &self,
        credential: &Credential,
        request: &DeleteCartLineRequest,
    ) -> Result<(), ApiError>;

    /// `DELETE clear-cart`.
    async fn clear_cart(&self, credential: &Credential) -> Result<(), ApiError>;

    /// `POST create-order`.
    async fn create_order(
        &self,
        credential: &Credential,
        request: &CreateOrderRequest,
    ) -> Result<PlacedOrder, ApiError>;

    /// `POST create-payment-intent`.
    async fn create_payment_intent(
        &self,
        credential: &Credential,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ApiError>;

    /// `POST confirm-payment`: bind a captured intent to its order.
    async fn confirm_payment(
        &self,
        credential: &Credential,
        request: &ConfirmPaymentRequest,
    ) -> Result<(), ApiError>;

    /// `POST validate-coupon`.
    async fn validate_coupon(
        &self,
        credential: &Credential,
        request: &ValidateCouponRequest,
    ) -> Result<Coupon, ApiError>;
}
