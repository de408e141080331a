//! Two tabs sharing one origin store.

#![allow(clippy::unwrap_used)]

use cartwheel_client::models::SessionStatus;
use cartwheel_client::storage::SharedStorage;
use cartwheel_integration_tests::{EMAIL, PASSWORD, TOKEN, backend, open_tab};
use secrecy::SecretString;

#[tokio::test]
async fn test_login_in_one_tab_reaches_the_other() {
    let backend = backend();
    backend.seed_line(TOKEN, "tee", 2);
    let shared = SharedStorage::new();
    let tab_a = open_tab(&shared, &backend);
    let tab_b = open_tab(&shared, &backend);

    assert_eq!(tab_b.storefront.initialize().await, SessionStatus::Anonymous);
    let events = tab_b.storefront.start();
    let mut cart = tab_b.storefront.cart().subscribe();

    tab_a
        .storefront
        .session()
        .login(EMAIL, &SecretString::from(PASSWORD), true)
        .await
        .unwrap();

    cart.wait_for(|state| state.snapshot.item_count() == 2)
        .await
        .unwrap();
    assert_eq!(tab_b.storefront.session().status(), SessionStatus::Verified);
    assert_eq!(backend.calls("current-user"), 1);

    events.shutdown().await;
}

#[tokio::test]
async fn test_logout_in_one_tab_clears_the_other_offline() {
    let backend = backend();
    backend.seed_line(TOKEN, "tee", 1);
    let shared = SharedStorage::new();
    let tab_a = open_tab(&shared, &backend);
    let tab_b = open_tab(&shared, &backend);

    tab_a
        .storefront
        .session()
        .login(EMAIL, &SecretString::from(PASSWORD), false)
        .await
        .unwrap();
    assert_eq!(tab_b.storefront.initialize().await, SessionStatus::Verified);
    assert_eq!(tab_b.storefront.cart().snapshot().item_count(), 1);

    let events = tab_b.storefront.start();
    let mut cart = tab_b.storefront.cart().subscribe();
    let verifications = backend.calls("current-user");

    tab_a.storefront.session().logout().await.unwrap();

    cart.wait_for(|state| state.snapshot.is_empty()).await.unwrap();
    assert_eq!(tab_b.storefront.session().status(), SessionStatus::Anonymous);
    assert_eq!(backend.calls("current-user"), verifications);
    assert_eq!(backend.calls("cart-view"), 1);

    events.shutdown().await;
}

#[tokio::test]
async fn test_remembered_email_is_shared() {
    let backend = backend();
    let shared = SharedStorage::new();
    let tab_a = open_tab(&shared, &backend);
    let tab_b = open_tab(&shared, &backend);

    tab_a
        .storefront
        .session()
        .login(EMAIL, &SecretString::from(PASSWORD), true)
        .await
        .unwrap();

    assert_eq!(
        tab_b.storefront.session().remembered_email().as_deref(),
        Some(EMAIL)
    );
}
