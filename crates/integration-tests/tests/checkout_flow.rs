//! Login, cart, coupon and checkout against the in-memory backend.

#![allow(clippy::unwrap_used)]

use cartwheel_client::ClientError;
use cartwheel_client::models::PaymentMethod;
use cartwheel_client::navigation::Route;
use cartwheel_client::payment::{CardDetails, GatewayError};
use cartwheel_client::services::checkout::CheckoutStep;
use cartwheel_client::storage::SharedStorage;
use cartwheel_core::{PaymentStatus, ProductId};
use cartwheel_integration_tests::{EMAIL, PASSWORD, TOKEN, backend, open_tab};
use rust_decimal::Decimal;
use secrecy::SecretString;

async fn login(tab: &cartwheel_integration_tests::Tab) {
    tab.storefront
        .session()
        .login(EMAIL, &SecretString::from(PASSWORD), false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_full_card_checkout() {
    let backend = backend();
    let tab = open_tab(&SharedStorage::new(), &backend);
    login(&tab).await;

    let cart = tab.storefront.cart();
    cart.add_line(ProductId::new("tee"), 2).await.unwrap();
    let line = cart.snapshot().lines().first().unwrap().line_id.clone();
    cart.increase(&line).await.unwrap();
    assert_eq!(cart.snapshot().item_count(), 3);

    let flow = tab.storefront.begin_checkout().unwrap();
    assert_eq!(flow.draft().form.personal_info.first_name, "Ann");
    flow.edit(|form| {
        form.personal_info.phone = "555-0100".to_string();
        form.shipping_address.street = "1 Main St".to_string();
        form.shipping_address.city = "Springfield".to_string();
        form.shipping_address.state = "IL".to_string();
        form.shipping_address.zip = "62701".to_string();
        form.payment_method = PaymentMethod::Card;
        form.card = CardDetails::new("4242 4242 4242 4242", "12/30", "123", "Ann Lee");
    })
    .unwrap();

    assert_eq!(flow.advance().await.unwrap(), CheckoutStep::ShippingAddress);
    assert_eq!(flow.advance().await.unwrap(), CheckoutStep::Payment);

    // 75 subtotal + 1500 shipping + 6 tax - 7.50 discount
    let pricing = flow.apply_coupon(" save10 ").await.unwrap();
    assert_eq!(pricing.discount, Decimal::new(750, 2));
    assert_eq!(pricing.total, Decimal::new(157_350, 2));

    assert_eq!(flow.advance().await.unwrap(), CheckoutStep::Succeeded);

    let intents = backend.payment_intent_requests();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents.first().unwrap().amount, 157_350);
    assert_eq!(
        backend.order_requests().first().unwrap().coupon_code.as_deref(),
        Some("SAVE10")
    );
    assert!(backend.cart(TOKEN).is_empty());
    assert!(tab.storefront.cart().snapshot().is_empty());

    let routes = tab.navigator.routes();
    let Some(Route::OrderSummary(summary)) = routes.last() else {
        panic!("expected order summary, got {routes:?}");
    };
    assert_eq!(summary.payment_status, PaymentStatus::Paid);
    assert_eq!(summary.total.amount, Decimal::new(157_350, 2));
}

#[tokio::test]
async fn test_declined_card_then_retry_places_one_order() {
    let backend = backend();
    let tab = open_tab(&SharedStorage::new(), &backend);
    login(&tab).await;
    tab.storefront
        .cart()
        .add_line(ProductId::new("tee"), 1)
        .await
        .unwrap();
    tab.gateway
        .push_outcome(Err(GatewayError::Declined("card declined".to_string())));

    let flow = tab.storefront.begin_checkout().unwrap();
    flow.edit(|form| {
        form.personal_info.phone = "555-0100".to_string();
        form.shipping_address.street = "1 Main St".to_string();
        form.shipping_address.city = "Springfield".to_string();
        form.shipping_address.state = "IL".to_string();
        form.shipping_address.zip = "62701".to_string();
        form.card = CardDetails::new("4000 0000 0000 0002", "12/30", "123", "Ann Lee");
    })
    .unwrap();
    flow.advance().await.unwrap();
    flow.advance().await.unwrap();

    let err = flow.advance().await.unwrap_err();
    assert!(matches!(err, ClientError::Payment(GatewayError::Declined(_))));
    assert_eq!(flow.step(), CheckoutStep::Confirmation);

    assert_eq!(flow.advance().await.unwrap(), CheckoutStep::Succeeded);
    assert_eq!(backend.calls("create-order"), 1);
    assert_eq!(backend.payment_confirmations().len(), 1);
}

#[tokio::test]
async fn test_stock_limit_is_enforced_locally() {
    let backend = backend();
    let tab = open_tab(&SharedStorage::new(), &backend);
    login(&tab).await;

    let cart = tab.storefront.cart();
    cart.add_line(ProductId::new("mug"), 1).await.unwrap();
    let line = cart.snapshot().lines().first().unwrap().line_id.clone();
    let calls = backend.total_calls();

    let err = cart.increase(&line).await.unwrap_err();
    assert!(matches!(err, ClientError::StockLimitExceeded { .. }));
    assert_eq!(backend.total_calls(), calls);
    assert_eq!(cart.snapshot().item_count(), 1);
}

#[tokio::test]
async fn test_checkout_requires_login() {
    let backend = backend();
    let tab = open_tab(&SharedStorage::new(), &backend);

    let err = tab.storefront.begin_checkout().err().unwrap();
    assert!(matches!(err, ClientError::AuthRequired));
}

#[tokio::test]
async fn test_revoked_credential_expires_session_on_mutation() {
    let backend = backend();
    let tab = open_tab(&SharedStorage::new(), &backend);
    login(&tab).await;
    backend.revoke(TOKEN);

    let err = tab
        .storefront
        .cart()
        .add_line(ProductId::new("tee"), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert!(tab.storefront.session().user().is_none());
    assert!(tab.storefront.cart().snapshot().is_empty());
}
