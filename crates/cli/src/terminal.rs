//! Terminal implementations of the engine's host seams.

use async_trait::async_trait;
use cartwheel_client::navigation::{Navigator, Route};
use cartwheel_client::payment::{
    BillingDetails, CardDetails, ConfirmedPayment, GatewayError, PaymentGateway,
};
use secrecy::SecretString;

/// Reports navigation requests as log lines.
pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: Route) {
        match route {
            Route::Login => tracing::info!("Run `cartwheel login` to continue"),
            Route::OrderSummary(summary) => {
                tracing::info!(
                    order_number = %summary.order_number,
                    total = %summary.total,
                    "Order placed"
                );
            }
            Route::Cart | Route::Home => tracing::debug!(?route, "Navigation requested"),
        }
    }
}

/// The terminal cannot capture cards.
pub struct NoGateway;

#[async_trait]
impl PaymentGateway for NoGateway {
    async fn confirm_card_payment(
        &self,
        _client_secret: &SecretString,
        card: &CardDetails,
        _billing: &BillingDetails,
    ) -> Result<ConfirmedPayment, GatewayError> {
        tracing::warn!(card = ?card, "Card payment attempted from the terminal");
        Err(GatewayError::Unavailable(
            "card payments are not supported from the terminal".to_string(),
        ))
    }
}
