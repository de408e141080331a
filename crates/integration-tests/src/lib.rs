//! End-to-end tests for the Cartwheel storefront client.
//!
//! Tests drive a full [`Storefront`] against the in-memory backend, gateway
//! and navigator from `cartwheel_client::testing`. Nothing touches the
//! network.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartwheel-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `checkout_flow` - Login, cart edits, coupon and payment
//! - `cross_tab` - Two tabs sharing one origin store

use std::sync::Arc;

use cartwheel_client::Storefront;
use cartwheel_client::config::ClientConfig;
use cartwheel_client::storage::{SharedStorage, TabStorage};
use cartwheel_client::testing::{FakeBackend, FakeGateway, RecordingNavigator, customer};
use rust_decimal::Decimal;
use url::Url;

/// Account email seeded by [`backend`].
pub const EMAIL: &str = "ann@example.com";
/// Account password seeded by [`backend`].
pub const PASSWORD: &str = "hunter22";
/// Token the backend issues for [`EMAIL`].
pub const TOKEN: &str = "tok-ann";

/// A backend with one account, two products and a coupon.
#[must_use]
pub fn backend() -> Arc<FakeBackend> {
    let backend = Arc::new(FakeBackend::new());
    backend.add_account(EMAIL, PASSWORD, TOKEN, customer("u1", "Ann Lee", EMAIL));
    backend.add_product("tee", "Tee", Decimal::from(25), Some(10));
    backend.add_product("mug", "Mug", Decimal::from(12), Some(1));
    backend.add_coupon(cartwheel_client::models::Coupon::percentage(
        "SAVE10",
        Decimal::from(10),
    ));
    backend
}

/// One browser tab wired to `backend`.
pub struct Tab {
    pub store: Arc<TabStorage>,
    pub storefront: Storefront,
    pub gateway: Arc<FakeGateway>,
    pub navigator: Arc<RecordingNavigator>,
}

/// Open a tab on `shared` talking to `backend`.
///
/// # Panics
///
/// Never in practice; the base URL is a constant.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn open_tab(shared: &SharedStorage, backend: &Arc<FakeBackend>) -> Tab {
    let store = Arc::new(shared.open_tab());
    let gateway = Arc::new(FakeGateway::default());
    let navigator = Arc::new(RecordingNavigator::default());
    let storefront = Storefront::new(
        ClientConfig::new(Url::parse("http://localhost:5000/api/").unwrap()),
        backend.clone(),
        gateway.clone(),
        navigator.clone(),
        store.clone(),
    );
    Tab {
        store,
        storefront,
        gateway,
        navigator,
    }
}
