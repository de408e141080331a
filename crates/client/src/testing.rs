//! In-memory collaborators for tests.
//!
//! Enabled for unit tests and, through the `test-support` feature, for the
//! integration test crate.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cartwheel_core::{Credential, Email, LineId, OrderId, OrderStatus, ProductId, User, UserId};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Notify, oneshot};

use crate::api::{
    AddToCartRequest, ApiError, AuthPayload, ConfirmPaymentRequest, CreateOrderRequest,
    DeleteCartLineRequest, PaymentIntent, PaymentIntentRequest, StorefrontApi, UpdateCartRequest,
    ValidateCouponRequest,
};
use crate::lock;
use crate::models::{Coupon, PlacedOrder, RawCartLine, RawProduct};
use crate::navigation::{Navigator, Route};
use crate::payment::{
    BillingDetails, CardDetails, ConfirmedPayment, GatewayError, IntentStatus, PaymentGateway,
};

/// A customer record for tests.
#[must_use]
pub fn customer(id: &str, name: &str, email: &str) -> User {
    User {
        id: UserId::new(id),
        name: name.to_owned(),
        email: email.to_owned(),
        role: cartwheel_core::UserRole::Customer,
        avatar_url: None,
    }
}

// =============================================================================
// FakeBackend
// =============================================================================

#[derive(Debug, Clone)]
struct StoredLine {
    id: LineId,
    product_id: Option<ProductId>,
    quantity: i64,
}

#[derive(Default)]
struct BackendState {
    passwords: HashMap<String, (String, String)>,
    users: HashMap<String, User>,
    revoked: HashSet<String>,
    products: HashMap<ProductId, RawProduct>,
    carts: HashMap<String, Vec<StoredLine>>,
    coupons: HashMap<String, Coupon>,
    failures: HashMap<&'static str, VecDeque<ApiError>>,
    calls: HashMap<&'static str, usize>,
    orders: Vec<CreateOrderRequest>,
    intents: Vec<PaymentIntentRequest>,
    confirmations: Vec<ConfirmPaymentRequest>,
    next_id: u64,
}

impl BackendState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn authorize(&self, credential: &Credential) -> Result<String, ApiError> {
        let token = credential.expose();
        if self.revoked.contains(token) {
            return Err(ApiError::Unauthorized);
        }
        Ok(token.to_owned())
    }

    fn raw_cart(&self, token: &str) -> Vec<RawCartLine> {
        self.carts
            .get(token)
            .map(|lines| {
                lines
                    .iter()
                    .map(|line| RawCartLine {
                        id: Some(line.id.clone()),
                        product: line
                            .product_id
                            .as_ref()
                            .and_then(|id| self.products.get(id))
                            .cloned(),
                        quantity: Some(line.quantity),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_stock(&self, product_id: Option<&ProductId>, quantity: i64) -> Result<(), ApiError> {
        let stock = product_id
            .and_then(|id| self.products.get(id))
            .and_then(|p| p.stock);
        match stock {
            Some(stock) if quantity > stock => {
                Err(ApiError::Rejected(format!("Only {stock} left in stock")))
            }
            _ => Ok(()),
        }
    }
}

/// A scriptable storefront backend.
///
/// Any token that was not [revoked](Self::revoke) may use the cart, order
/// and coupon operations; `current-user` only knows tokens registered with
/// [`add_account`](Self::add_account). Operations can be made to fail once
/// with [`fail_next`](Self::fail_next) or to wait at a gate with
/// [`hold`](Self::hold) so tests control the order in which they settle.
/// A held call computes its response when it is made, not when released.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
    gates: Mutex<Gates>,
    gate_changed: Notify,
}

#[derive(Default)]
struct Gates {
    holding: HashSet<&'static str>,
    held: HashMap<&'static str, Vec<Option<oneshot::Sender<()>>>>,
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    /// Register an account that can log in and be verified.
    pub fn add_account(&self, email: &str, password: &str, token: &str, user: User) {
        let mut state = lock(&self.state);
        state
            .passwords
            .insert(email.to_owned(), (password.to_owned(), token.to_owned()));
        state.users.insert(token.to_owned(), user);
    }

    /// Add a product to the catalog.
    pub fn add_product(&self, id: &str, name: &str, price: Decimal, stock: Option<i64>) {
        let product = RawProduct {
            id: Some(ProductId::new(id)),
            name: Some(name.to_owned()),
            price: Some(price),
            stock,
            image: None,
        };
        lock(&self.state).products.insert(ProductId::new(id), product);
    }

    /// Register a coupon under its normalized code.
    pub fn add_coupon(&self, coupon: Coupon) {
        lock(&self.state).coupons.insert(coupon.code.clone(), coupon);
    }

    /// Put a line straight into a cart.
    pub fn seed_line(&self, token: &str, product_id: &str, quantity: i64) -> LineId {
        self.push_line(token, Some(ProductId::new(product_id)), quantity)
    }

    /// Put a line whose product no longer exists into a cart.
    pub fn seed_orphan_line(&self, token: &str, quantity: i64) -> LineId {
        self.push_line(token, None, quantity)
    }

    fn push_line(&self, token: &str, product_id: Option<ProductId>, quantity: i64) -> LineId {
        let mut state = lock(&self.state);
        let id = LineId::new(format!("line-{}", state.next_id()));
        state
            .carts
            .entry(token.to_owned())
            .or_default()
            .push(StoredLine {
                id: id.clone(),
                product_id,
                quantity,
            });
        id
    }

    /// Reject `token` from now on.
    pub fn revoke(&self, token: &str) {
        lock(&self.state).revoked.insert(token.to_owned());
    }

    /// Make the next call to `op` fail with `error`.
    pub fn fail_next(&self, op: &'static str, error: ApiError) {
        lock(&self.state)
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Calls made to `op`.
    #[must_use]
    pub fn calls(&self, op: &str) -> usize {
        lock(&self.state).calls.get(op).copied().unwrap_or(0)
    }

    /// Calls made to any operation.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        lock(&self.state).calls.values().sum()
    }

    /// Lines in `token`'s cart, as the backend would send them.
    #[must_use]
    pub fn cart(&self, token: &str) -> Vec<RawCartLine> {
        lock(&self.state).raw_cart(token)
    }

    /// Every `create-order` body received.
    #[must_use]
    pub fn order_requests(&self) -> Vec<CreateOrderRequest> {
        lock(&self.state).orders.clone()
    }

    /// Every `create-payment-intent` body received.
    #[must_use]
    pub fn payment_intent_requests(&self) -> Vec<PaymentIntentRequest> {
        lock(&self.state).intents.clone()
    }

    /// Every `confirm-payment` body received.
    #[must_use]
    pub fn payment_confirmations(&self) -> Vec<ConfirmPaymentRequest> {
        lock(&self.state).confirmations.clone()
    }

    // -------------------------------------------------------------------------
    // Gates
    // -------------------------------------------------------------------------

    /// Make every later call to `op` wait until released.
    pub fn hold(&self, op: &'static str) {
        lock(&self.gates).holding.insert(op);
    }

    /// Wait until `count` calls to `op` are (or were) held.
    pub async fn wait_for_held(&self, op: &str, count: usize) {
        loop {
            let changed = self.gate_changed.notified();
            let held = lock(&self.gates).held.get(op).map_or(0, Vec::len);
            if held >= count {
                return;
            }
            changed.await;
        }
    }

    /// Let the `index`th held call to `op` settle.
    pub fn release(&self, op: &str, index: usize) {
        let sender = lock(&self.gates)
            .held
            .get_mut(op)
            .and_then(|held| held.get_mut(index))
            .and_then(Option::take);
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    fn gate(&self, op: &'static str) -> Option<oneshot::Receiver<()>> {
        let mut gates = lock(&self.gates);
        if !gates.holding.contains(op) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        gates.held.entry(op).or_default().push(Some(tx));
        drop(gates);
        self.gate_changed.notify_waiters();
        Some(rx)
    }

    /// Count the call, compute the response, then wait at the gate if `op`
    /// is held.
    async fn call<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut BackendState) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let result = {
            let mut state = lock(&self.state);
            *state.calls.entry(op).or_default() += 1;
            match state.failures.get_mut(op).and_then(VecDeque::pop_front) {
                Some(error) => Err(error),
                None => f(&mut state),
            }
        };
        if let Some(gate) = self.gate(op) {
            let _ = gate.await;
        }
        result
    }
}

#[async_trait]
impl StorefrontApi for FakeBackend {
    async fn current_user(&self, credential: &Credential) -> Result<User, ApiError> {
        self.call("current-user", |state| {
            let token = state.authorize(credential)?;
            state.users.get(&token).cloned().ok_or(ApiError::Unauthorized)
        })
        .await
    }

    async fn login(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthPayload, ApiError> {
        self.call("login", |state| {
            let invalid = || ApiError::Rejected("Invalid email or password".to_string());
            let (expected, token) = state.passwords.get(email.as_str()).ok_or_else(invalid)?;
            if expected != password.expose_secret() {
                return Err(invalid());
            }
            let user = state.users.get(token).cloned().ok_or_else(invalid)?;
            Ok(AuthPayload {
                user,
                token: token.clone(),
            })
        })
        .await
    }

    async fn logout(&self, _credential: Option<&Credential>) -> Result<(), ApiError> {
        self.call("logout", |_| Ok(())).await
    }

    async fn cart_view(&self, credential: &Credential) -> Result<Vec<RawCartLine>, ApiError> {
        self.call("cart-view", |state| {
            let token = state.authorize(credential)?;
            Ok(state.raw_cart(&token))
        })
        .await
    }

    async fn add_to_cart(
        &self,
        credential: &Credential,
        request: &AddToCartRequest,
    ) -> Result<(), ApiError> {
        self.call("add-to-cart", |state| {
            let token = state.authorize(credential)?;
            if !state.products.contains_key(&request.product_id) {
                return Err(ApiError::Rejected("Product not found".to_string()));
            }
            let existing = state
                .carts
                .get(&token)
                .and_then(|lines| {
                    lines
                        .iter()
                        .find(|l| l.product_id.as_ref() == Some(&request.product_id))
                })
                .map_or(0, |l| l.quantity);
            let quantity = existing + i64::from(request.quantity);
            state.check_stock(Some(&request.product_id), quantity)?;

            let id = LineId::new(format!("line-{}", state.next_id()));
            let lines = state.carts.entry(token).or_default();
            match lines
                .iter_mut()
                .find(|l| l.product_id.as_ref() == Some(&request.product_id))
            {
                Some(line) => line.quantity = quantity,
                None => lines.push(StoredLine {
                    id,
                    product_id: Some(request.product_id.clone()),
                    quantity,
                }),
            }
            Ok(())
        })
        .await
    }

    async fn update_cart(
        &self,
        credential: &Credential,
        request: &UpdateCartRequest,
    ) -> Result<(), ApiError> {
        self.call("update-cart", |state| {
            let token = state.authorize(credential)?;
            let quantity = i64::from(request.quantity);
            let product_id = state
                .carts
                .get(&token)
                .and_then(|lines| lines.iter().find(|l| l.id == request.line_id))
                .ok_or_else(|| ApiError::Rejected("Cart line not found".to_string()))?
                .product_id
                .clone();
            state.check_stock(product_id.as_ref(), quantity)?;

            if let Some(line) = state
                .carts
                .get_mut(&token)
                .and_then(|lines| lines.iter_mut().find(|l| l.id == request.line_id))
            {
                line.quantity = quantity;
            }
            Ok(())
        })
        .await
    }

    async fn delete_cart_line(
        &self,
        credential: &Credential,
        request: &DeleteCartLineRequest,
    ) -> Result<(), ApiError> {
        self.call("delete-cart-line", |state| {
            let token = state.authorize(credential)?;
            let lines = state.carts.entry(token).or_default();
            let before = lines.len();
            lines.retain(|l| l.id != request.line_id);
            if lines.len() == before {
                return Err(ApiError::Rejected("Cart line not found".to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn clear_cart(&self, credential: &Credential) -> Result<(), ApiError> {
        self.call("clear-cart", |state| {
            let token = state.authorize(credential)?;
            state.carts.remove(&token);
            Ok(())
        })
        .await
    }

    async fn create_order(
        &self,
        credential: &Credential,
        request: &CreateOrderRequest,
    ) -> Result<PlacedOrder, ApiError> {
        self.call("create-order", |state| {
            let token = state.authorize(credential)?;
            let has_items = state.carts.get(&token).is_some_and(|lines| {
                lines
                    .iter()
                    .any(|l| l.quantity > 0 && l.product_id.is_some())
            });
            if !has_items {
                return Err(ApiError::Rejected("Cart is empty".to_string()));
            }

            state.orders.push(request.clone());
            state.carts.remove(&token);
            let n = state.next_id();
            Ok(PlacedOrder {
                order_id: OrderId::new(format!("order-{n}")),
                order_number: format!("ORD-{}", 1000 + n),
                status: OrderStatus::Pending,
            })
        })
        .await
    }

    async fn create_payment_intent(
        &self,
        credential: &Credential,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ApiError> {
        self.call("create-payment-intent", |state| {
            state.authorize(credential)?;
            state.intents.push(request.clone());
            let n = state.next_id();
            Ok(PaymentIntent {
                client_secret: SecretString::from(format!("pi_{n}_secret")),
            })
        })
        .await
    }

    async fn confirm_payment(
        &self,
        credential: &Credential,
        request: &ConfirmPaymentRequest,
    ) -> Result<(), ApiError> {
        self.call("confirm-payment", |state| {
            state.authorize(credential)?;
            state.confirmations.push(request.clone());
            Ok(())
        })
        .await
    }

    async fn validate_coupon(
        &self,
        credential: &Credential,
        request: &ValidateCouponRequest,
    ) -> Result<Coupon, ApiError> {
        self.call("validate-coupon", |state| {
            state.authorize(credential)?;
            state
                .coupons
                .get(&request.code)
                .cloned()
                .ok_or_else(|| ApiError::Rejected("Invalid coupon code".to_string()))
        })
        .await
    }
}

// =============================================================================
// FakeGateway
// =============================================================================

/// A payment gateway that plays back scripted outcomes, then succeeds.
#[derive(Default)]
pub struct FakeGateway {
    outcomes: Mutex<VecDeque<Result<IntentStatus, GatewayError>>>,
    calls: AtomicUsize,
}

impl FakeGateway {
    /// Queue the outcome of a later confirmation.
    pub fn push_outcome(&self, outcome: Result<IntentStatus, GatewayError>) {
        lock(&self.outcomes).push_back(outcome);
    }

    /// Confirmations attempted.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn confirm_card_payment(
        &self,
        _client_secret: &SecretString,
        _card: &CardDetails,
        _billing: &BillingDetails,
    ) -> Result<ConfirmedPayment, GatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = lock(&self.outcomes)
            .pop_front()
            .unwrap_or(Ok(IntentStatus::Succeeded));
        outcome.map(|status| ConfirmedPayment {
            intent_id: format!("pi_{n}"),
            status,
        })
    }
}

// =============================================================================
// RecordingNavigator
// =============================================================================

/// Records every navigation.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    /// Routes navigated to, oldest first.
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        lock(&self.routes).clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        lock(&self.routes).push(route);
    }
}
