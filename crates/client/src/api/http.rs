//! `reqwest` implementation of [`StorefrontApi`].

use std::sync::Arc;

use async_trait::async_trait;
use cartwheel_core::{Credential, Email, User};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use super::{
    AddToCartRequest, ApiError, AuthPayload, ConfirmPaymentRequest, CreateOrderRequest,
    DeleteCartLineRequest, LoginRequest, PaymentIntent, PaymentIntentRequest, StorefrontApi,
    UpdateCartRequest, ValidateCouponRequest, endpoints,
};
use crate::config::ClientConfig;
use crate::models::{Coupon, PlacedOrder, RawCartLine};

/// Characters of a response body kept in logs and error messages.
const BODY_LOG_LIMIT: usize = 500;

/// The backend's response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

const fn default_success() -> bool {
    true
}

/// `cart-view` data: either the line array or an object wrapping it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CartViewData {
    Lines(Vec<RawCartLine>),
    Wrapped {
        #[serde(alias = "cartItems", alias = "lines")]
        items: Vec<RawCartLine>,
    },
}

impl CartViewData {
    fn into_lines(self) -> Vec<RawCartLine> {
        match self {
            Self::Lines(lines) | Self::Wrapped { items: lines } => lines,
        }
    }
}

/// `current-user` data: the user, bare or under `user`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CurrentUserData {
    Wrapped { user: User },
    Bare(User),
}

// =============================================================================
// HttpApi
// =============================================================================

/// HTTP client for the storefront backend.
#[derive(Clone)]
pub struct HttpApi {
    inner: Arc<HttpApiInner>,
}

struct HttpApiInner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpApi {
    /// Create a client for the configured backend.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(HttpApiInner {
                client: reqwest::Client::new(),
                base_url: config.api_base_url.clone(),
            }),
        }
    }

    /// Send a request and decode the envelope.
    async fn execute<T, B>(
        &self,
        method: Method,
        path: &str,
        credential: Option<&Credential>,
        body: Option<&B>,
    ) -> Result<Option<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let url = self.inner.base_url.join(path)?;

        let mut request = self
            .inner
            .client
            .request(method, url)
            .header("Accept", "application/json");

        if let Some(credential) = credential {
            request = request.header("Authorization", credential.bearer_header());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        decode_envelope(status, &response_text)
    }

    async fn execute_unit<B>(
        &self,
        method: Method,
        path: &str,
        credential: Option<&Credential>,
        body: Option<&B>,
    ) -> Result<(), ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.execute::<IgnoredAny, B>(method, path, credential, body)
            .await
            .map(|_| ())
    }
}

/// Decode a backend response.
///
/// - 401 is always [`ApiError::Unauthorized`], whatever the body says
/// - `success: false` becomes [`ApiError::Rejected`] with the backend message
/// - other non-success statuses become [`ApiError::Status`]
fn decode_envelope<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<Option<T>, ApiError> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }

    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(
                status = %status,
                error = %e,
                body = %truncate(body),
                "Failed to parse backend response"
            );
            if status.is_success() {
                return Err(ApiError::Parse(e));
            }
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: truncate(body),
            });
        }
    };

    if status.is_server_error() {
        tracing::error!(
            status = %status,
            body = %truncate(body),
            "Backend returned server error"
        );
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: envelope
                .message
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
        });
    }

    if !envelope.success || !status.is_success() {
        let message = envelope
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "The request was rejected".to_string());
        return Err(ApiError::Rejected(message));
    }

    Ok(envelope.data)
}

fn truncate(body: &str) -> String {
    body.chars().take(BODY_LOG_LIMIT).collect()
}

#[async_trait]
impl StorefrontApi for HttpApi {
    #[instrument(skip_all)]
    async fn current_user(&self, credential: &Credential) -> Result<User, ApiError> {
        let data: Option<CurrentUserData> = self
            .execute::<_, ()>(Method::GET, endpoints::CURRENT_USER, Some(credential), None)
            .await?;

        match data.ok_or(ApiError::MissingData("user"))? {
            CurrentUserData::Wrapped { user } | CurrentUserData::Bare(user) => Ok(user),
        }
    }

    #[instrument(skip_all, fields(email = %email))]
    async fn login(&self, email: &Email, password: &SecretString) -> Result<AuthPayload, ApiError> {
        let body = LoginRequest {
            email: email.as_str(),
            password: password.expose_secret(),
        };
        self.execute(Method::POST, endpoints::LOGIN, None, Some(&body))
            .await?
            .ok_or(ApiError::MissingData("token"))
    }

    #[instrument(skip_all)]
    async fn logout(&self, credential: Option<&Credential>) -> Result<(), ApiError> {
        self.execute_unit::<()>(Method::GET, endpoints::LOGOUT, credential, None)
            .await
    }

    #[instrument(skip_all)]
    async fn cart_view(&self, credential: &Credential) -> Result<Vec<RawCartLine>, ApiError> {
        let data: Option<CartViewData> = self
            .execute::<_, ()>(Method::GET, endpoints::CART_VIEW, Some(credential), None)
            .await?;
        Ok(data.map(CartViewData::into_lines).unwrap_or_default())
    }

    #[instrument(skip_all, fields(product_id = %request.product_id, quantity = request.quantity))]
    async fn add_to_cart(
        &self,
        credential: &Credential,
        request: &AddToCartRequest,
    ) -> Result<(), ApiError> {
        self.execute_unit(Method::POST, endpoints::ADD_TO_CART, Some(credential), Some(request))
            .await
    }

    #[instrument(skip_all, fields(line_id = %request.line_id, quantity = request.quantity))]
    async fn update_cart(
        &self,
        credential: &Credential,
        request: &UpdateCartRequest,
    ) -> Result<(), ApiError> {
        self.execute_unit(Method::POST, endpoints::UPDATE_CART, Some(credential), Some(request))
            .await
    }

    #[instrument(skip_all, fields(line_id = %request.line_id))]
    async fn delete_cart_line(
        &self,
        credential: &Credential,
        request: &DeleteCartLineRequest,
    ) -> Result<(), ApiError> {
        self.execute_unit(
            Method::DELETE,
            endpoints::DELETE_CART_LINE,
            Some(credential),
            Some(request),
        )
        .await
    }

    #[instrument(skip_all)]
    async fn clear_cart(&self, credential: &Credential) -> Result<(), ApiError> {
        self.execute_unit::<()>(Method::DELETE, endpoints::CLEAR_CART, Some(credential), None)
            .await
    }

    #[instrument(skip_all, fields(payment_method = ?request.payment_method))]
    async fn create_order(
        &self,
        credential: &Credential,
        request: &CreateOrderRequest,
    ) -> Result<PlacedOrder, ApiError> {
        self.execute(Method::POST, endpoints::CREATE_ORDER, Some(credential), Some(request))
            .await?
            .ok_or(ApiError::MissingData("order"))
    }

    #[instrument(skip_all, fields(order_id = %request.order_id, amount = request.amount))]
    async fn create_payment_intent(
        &self,
        credential: &Credential,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ApiError> {
        self.execute(
            Method::POST,
            endpoints::CREATE_PAYMENT_INTENT,
            Some(credential),
            Some(request),
        )
        .await?
        .ok_or(ApiError::MissingData("clientSecret"))
    }

    #[instrument(skip_all, fields(order_id = %request.order_id))]
    async fn confirm_payment(
        &self,
        credential: &Credential,
        request: &ConfirmPaymentRequest,
    ) -> Result<(), ApiError> {
        self.execute_unit(
            Method::POST,
            endpoints::CONFIRM_PAYMENT,
            Some(credential),
            Some(request),
        )
        .await
    }

    #[instrument(skip_all, fields(code = %request.code))]
    async fn validate_coupon(
        &self,
        credential: &Credential,
        request: &ValidateCouponRequest,
    ) -> Result<Coupon, ApiError> {
        self.execute(
            Method::POST,
            endpoints::VALIDATE_COUPON,
            Some(credential),
            Some(request),
        )
        .await?
        .ok_or(ApiError::MissingData("coupon"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_401_is_unauthorized_regardless_of_body() {
        let result = decode_envelope::<IgnoredAny>(StatusCode::UNAUTHORIZED, "<html>nope</html>");
        assert!(matches!(result, Err(ApiError::Unauthorized)));

        let result = decode_envelope::<IgnoredAny>(
            StatusCode::UNAUTHORIZED,
            r#"{"success": false, "message": "jwt expired"}"#,
        );
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_success_false_is_rejected_with_message() {
        let result = decode_envelope::<IgnoredAny>(
            StatusCode::OK,
            r#"{"success": false, "message": "Product is out of stock"}"#,
        );
        match result {
            Err(ApiError::Rejected(message)) => assert_eq!(message, "Product is out of stock"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_client_error_status_uses_envelope_message() {
        let result = decode_envelope::<IgnoredAny>(
            StatusCode::BAD_REQUEST,
            r#"{"success": false, "message": "Invalid coupon"}"#,
        );
        assert!(matches!(result, Err(ApiError::Rejected(m)) if m == "Invalid coupon"));
    }

    #[test]
    fn test_server_error_is_status() {
        let result = decode_envelope::<IgnoredAny>(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(result, Err(ApiError::Status { status: 502, .. })));

        let result = decode_envelope::<IgnoredAny>(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"success": false}"#,
        );
        assert!(matches!(result, Err(ApiError::Status { status: 500, .. })));
    }

    #[test]
    fn test_unparseable_success_is_parse_error() {
        let result = decode_envelope::<IgnoredAny>(StatusCode::OK, "not json");
        assert!(matches!(result, Err(ApiError::Parse(_))));
    }

    #[test]
    fn test_data_is_decoded() {
        let body = r#"{"success": true, "data": [{"_id": "l1", "quantity": 2}]}"#;
        let data: Option<CartViewData> = decode_envelope(StatusCode::OK, body).unwrap();
        let lines = data.unwrap().into_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines.first().unwrap().quantity, Some(2));
    }

    #[test]
    fn test_wrapped_cart_and_missing_success_flag() {
        let body = r#"{"data": {"cartItems": []}}"#;
        let data: Option<CartViewData> = decode_envelope(StatusCode::OK, body).unwrap();
        assert!(data.unwrap().into_lines().is_empty());
    }

    #[test]
    fn test_current_user_shapes() {
        let wrapped: CurrentUserData =
            serde_json::from_str(r#"{"user": {"_id": "u1", "email": "a@b.co"}}"#).unwrap();
        assert!(matches!(wrapped, CurrentUserData::Wrapped { .. }));

        let bare: CurrentUserData =
            serde_json::from_str(r#"{"_id": "u1", "email": "a@b.co"}"#).unwrap();
        assert!(matches!(bare, CurrentUserData::Bare(_)));
    }

    #[test]
    fn test_truncate_limits_body() {
        let body = "x".repeat(2000);
        assert_eq!(truncate(&body).len(), BODY_LOG_LIMIT);
    }
}
