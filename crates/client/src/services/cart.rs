//! Cart Synchronization Engine.
//!
//! The backend owns the cart. Every mutation, whether it succeeds or
//! fails, is followed by a full re-fetch; the snapshot is never patched
//! locally. When re-fetches overlap, whichever settles last wins.
//!
//! Each line carries its own pending flag so its controls can be disabled
//! while a request is in flight. Different lines mutate independently.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cartwheel_core::{LineId, ProductId};
use tokio::sync::watch;
use tracing::instrument;

use crate::api::{
    AddToCartRequest, ApiError, DeleteCartLineRequest, StorefrontApi, UpdateCartRequest,
};
use crate::error::{ClientError, add_breadcrumb};
use crate::events::{Event, EventBus};
use crate::models::{CartLine, CartSnapshot, SessionTicket};
use crate::services::session::SessionManager;

/// What cart surfaces render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    /// Latest snapshot from the backend.
    pub snapshot: CartSnapshot,
    /// Lines with a request in flight.
    pub pending: BTreeSet<LineId>,
    /// Lines whose removal was requested but not yet confirmed by a fetch.
    pub removing: BTreeSet<LineId>,
    /// Whether a fetch is in flight.
    pub loading: bool,
}

impl CartState {
    /// Whether controls for `line_id` should be disabled.
    #[must_use]
    pub fn is_pending(&self, line_id: &LineId) -> bool {
        self.pending.contains(line_id)
    }
}

/// A request the engine sends to the backend.
#[derive(Debug)]
enum Mutation {
    Add { product_id: ProductId, quantity: u32 },
    Update { line_id: LineId, quantity: u32 },
    Delete { line_id: LineId },
    Clear,
}

impl Mutation {
    const fn line_id(&self) -> Option<&LineId> {
        match self {
            Self::Update { line_id, .. } | Self::Delete { line_id } => Some(line_id),
            Self::Add { .. } | Self::Clear => None,
        }
    }

    const fn describe(&self) -> &'static str {
        match self {
            Self::Add { .. } => "Added to cart",
            Self::Update { .. } => "Changed quantity",
            Self::Delete { .. } => "Removed line",
            Self::Clear => "Cleared cart",
        }
    }
}

/// Owner of the cart snapshot for one tab.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CartEngine {
    inner: Arc<CartInner>,
}

struct CartInner {
    api: Arc<dyn StorefrontApi>,
    session: SessionManager,
    bus: EventBus,
    state: watch::Sender<CartState>,
    fetches_in_flight: AtomicUsize,
}

impl CartEngine {
    /// Create an engine with an empty cart.
    #[must_use]
    pub fn new(api: Arc<dyn StorefrontApi>, session: SessionManager, bus: EventBus) -> Self {
        let (state, _) = watch::channel(CartState::default());
        Self {
            inner: Arc::new(CartInner {
                api,
                session,
                bus,
                state,
                fetches_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CartState {
        self.inner.state.borrow().clone()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.inner.state.borrow().snapshot.clone()
    }

    /// Watch the cart. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.inner.state.subscribe()
    }

    fn line(&self, line_id: &LineId) -> Result<CartLine, ClientError> {
        self.inner
            .state
            .borrow()
            .snapshot
            .line(line_id)
            .cloned()
            .ok_or_else(|| ClientError::UnknownLine(line_id.clone()))
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    /// Replace the snapshot with the backend's cart.
    ///
    /// Without a verified session there is nothing to fetch and the local
    /// cart is emptied. A result that arrives after the session changed is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SessionExpired` if the credential was rejected
    /// and `ClientError::Network` for transport failures.
    #[instrument(skip(self))]
    pub async fn fetch_snapshot(&self) -> Result<(), ClientError> {
        let Some(ticket) = self.inner.session.ticket() else {
            self.reset();
            return Ok(());
        };
        self.fetch_with(&ticket).await
    }

    async fn fetch_with(&self, ticket: &SessionTicket) -> Result<(), ClientError> {
        let result = {
            let _loading = LoadingGuard::enter(self);
            self.inner.api.cart_view(ticket.credential()).await
        };

        if !self.inner.session.is_current(ticket) {
            tracing::debug!("Discarding cart fetched for a previous session");
            return Ok(());
        }

        let snapshot = CartSnapshot::from_raw(self.inner.session.guard(ticket, result)?);
        tracing::debug!(lines = snapshot.lines().len(), "Cart snapshot updated");

        self.inner.state.send_modify(|state| {
            let CartState {
                snapshot: current,
                removing,
                ..
            } = state;
            *current = snapshot;
            removing.retain(|id| current.line(id).is_some());
        });
        self.inner.bus.publish(Event::CartChanged);
        Ok(())
    }

    /// Re-sync after a session change: fetch for a verified session, empty
    /// the cart otherwise. No request is made without a credential.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, if a fetch was attempted.
    pub async fn on_session_changed(&self) -> Result<(), ClientError> {
        self.fetch_snapshot().await
    }

    /// Empty the local cart without contacting the backend.
    pub fn reset(&self) {
        let changed = self.inner.state.send_if_modified(|state| {
            let emptied = CartState {
                loading: state.loading,
                ..CartState::default()
            };
            if *state == emptied {
                return false;
            }
            *state = emptied;
            true
        });
        if changed {
            tracing::debug!("Cart reset");
            self.inner.bus.publish(Event::CartChanged);
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add `quantity` units of a product.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AuthRequired` without a verified session and
    /// `ClientError::InvalidQuantity` for zero; otherwise the backend result.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_line(&self, product_id: ProductId, quantity: u32) -> Result<(), ClientError> {
        let ticket = self.inner.session.require_credential()?;
        if quantity == 0 {
            return Err(ClientError::InvalidQuantity);
        }
        self.run(&ticket, Mutation::Add {
            product_id,
            quantity,
        })
        .await
    }

    /// Add one unit to a line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::StockLimitExceeded` without a request when the
    /// line is already at its known stock limit.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn increase(&self, line_id: &LineId) -> Result<(), ClientError> {
        let ticket = self.inner.session.require_credential()?;
        let line = self.line(line_id)?;

        if line.at_stock_limit() {
            let limit = line.stock_limit.unwrap_or(line.quantity);
            tracing::warn!(limit, "Stock limit reached");
            return Err(ClientError::StockLimitExceeded {
                line_id: line_id.clone(),
                limit,
            });
        }

        self.run(&ticket, Mutation::Update {
            line_id: line_id.clone(),
            quantity: line.quantity.saturating_add(1),
        })
        .await
    }

    /// Remove one unit. A line at quantity 1 is removed, never set to 0.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AuthRequired` without a verified session;
    /// otherwise the backend result.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn decrease(&self, line_id: &LineId) -> Result<(), ClientError> {
        let ticket = self.inner.session.require_credential()?;
        let line = self.line(line_id)?;

        let mutation = if line.quantity <= 1 {
            Mutation::Delete {
                line_id: line_id.clone(),
            }
        } else {
            Mutation::Update {
                line_id: line_id.clone(),
                quantity: line.quantity - 1,
            }
        };
        self.run(&ticket, mutation).await
    }

    /// Remove a line. It is flagged as removing until a fetch confirms it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AuthRequired` without a verified session;
    /// otherwise the backend result.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove(&self, line_id: &LineId) -> Result<(), ClientError> {
        let ticket = self.inner.session.require_credential()?;
        self.line(line_id)?;
        self.run(&ticket, Mutation::Delete {
            line_id: line_id.clone(),
        })
        .await
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AuthRequired` without a verified session;
    /// otherwise the backend result.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), ClientError> {
        let ticket = self.inner.session.require_credential()?;
        self.run(&ticket, Mutation::Clear).await
    }

    /// Send a mutation, then re-fetch whatever the outcome.
    async fn run(&self, ticket: &SessionTicket, mutation: Mutation) -> Result<(), ClientError> {
        let _pending = match mutation.line_id() {
            Some(line_id) => Some(PendingGuard::acquire(
                self,
                line_id,
                matches!(mutation, Mutation::Delete { .. }),
            )?),
            None => None,
        };

        add_breadcrumb("cart", mutation.describe(), None);

        let result = self.send(ticket, &mutation).await;
        let outcome = self.inner.session.guard(ticket, result);
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "Cart mutation failed");
        }

        let refetch = self.fetch_snapshot().await;
        outcome.and(refetch)
    }

    async fn send(&self, ticket: &SessionTicket, mutation: &Mutation) -> Result<(), ApiError> {
        let api = &self.inner.api;
        let credential = ticket.credential();
        match mutation {
            Mutation::Add {
                product_id,
                quantity,
            } => {
                api.add_to_cart(credential, &AddToCartRequest {
                    product_id: product_id.clone(),
                    quantity: *quantity,
                })
                .await
            }
            Mutation::Update { line_id, quantity } => {
                api.update_cart(credential, &UpdateCartRequest {
                    line_id: line_id.clone(),
                    quantity: *quantity,
                })
                .await
            }
            Mutation::Delete { line_id } => {
                api.delete_cart_line(credential, &DeleteCartLineRequest {
                    line_id: line_id.clone(),
                })
                .await
            }
            Mutation::Clear => api.clear_cart(credential).await,
        }
    }
}

/// Marks a line pending (and optionally removing) for as long as it lives.
/// Dropping it re-enables the line however the request ended.
struct PendingGuard {
    engine: CartEngine,
    line_id: LineId,
}

impl PendingGuard {
    fn acquire(engine: &CartEngine, line_id: &LineId, removing: bool) -> Result<Self, ClientError> {
        let acquired = engine.inner.state.send_if_modified(|state| {
            if !state.pending.insert(line_id.clone()) {
                return false;
            }
            if removing {
                state.removing.insert(line_id.clone());
            }
            true
        });

        if !acquired {
            tracing::debug!(line_id = %line_id, "Line already has a request in flight");
            return Err(ClientError::LineBusy(line_id.clone()));
        }

        Ok(Self {
            engine: engine.clone(),
            line_id: line_id.clone(),
        })
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let line_id = &self.line_id;
        self.engine.inner.state.send_modify(|state| {
            state.pending.remove(line_id);
            state.removing.remove(line_id);
        });
    }
}

/// Keeps `loading` set while at least one fetch is in flight.
struct LoadingGuard<'a> {
    engine: &'a CartEngine,
}

impl<'a> LoadingGuard<'a> {
    fn enter(engine: &'a CartEngine) -> Self {
        if engine.inner.fetches_in_flight.fetch_add(1, Ordering::SeqCst) == 0 {
            engine.inner.state.send_modify(|state| state.loading = true);
        }
        Self { engine }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.engine.inner.fetches_in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.engine
                .inner
                .state
                .send_modify(|state| state.loading = false);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use cartwheel_core::{Credential, User, UserId, UserRole};
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::SessionStatus;
    use crate::navigation::{LoginRedirect, Route};
    use crate::storage::SharedStorage;
    use crate::testing::{FakeBackend, RecordingNavigator};

    struct Harness {
        backend: Arc<FakeBackend>,
        navigator: Arc<RecordingNavigator>,
        session: SessionManager,
        cart: CartEngine,
    }

    fn ann() -> User {
        User {
            id: UserId::new("u1"),
            name: "Ann".to_string(),
            email: "ann@example.com".to_string(),
            role: UserRole::Customer,
            avatar_url: None,
        }
    }

    fn harness() -> Harness {
        let backend = Arc::new(FakeBackend::new());
        backend.add_account("ann@example.com", "pw", "tok", ann());
        backend.add_product("mug", "Mug", Decimal::from(12), Some(3));
        backend.add_product("tee", "Tee", Decimal::from(20), Some(5));
        backend.add_product("pin", "Pin", Decimal::from(2), None);

        let navigator = Arc::new(RecordingNavigator::default());
        let bus = EventBus::new();
        let session = SessionManager::new(
            backend.clone(),
            Arc::new(SharedStorage::new().open_tab()),
            bus.clone(),
            LoginRedirect::new(navigator.clone(), Duration::from_millis(1500)),
        );
        let cart = CartEngine::new(backend.clone(), session.clone(), bus);
        Harness {
            backend,
            navigator,
            session,
            cart,
        }
    }

    async fn logged_in() -> Harness {
        let h = harness();
        h.session
            .on_in_process_login(ann(), Credential::parse("tok").unwrap());
        h
    }

    fn quantity(cart: &CartEngine, line_id: &LineId) -> Option<u32> {
        cart.snapshot().line(line_id).map(|line| line.quantity)
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_require_login() {
        let h = harness();

        let err = h
            .cart
            .add_line(ProductId::new("mug"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthRequired));
        assert_eq!(h.backend.total_calls(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.navigator.routes(), vec![Route::Login]);
    }

    #[tokio::test]
    async fn test_fetch_without_credential_makes_no_request() {
        let h = harness();
        h.cart.fetch_snapshot().await.unwrap();
        assert_eq!(h.backend.total_calls(), 0);
        assert!(h.cart.snapshot().lines().is_empty());
    }

    #[tokio::test]
    async fn test_add_line_refetches() {
        let h = logged_in().await;

        h.cart.add_line(ProductId::new("mug"), 2).await.unwrap();

        let snapshot = h.cart.snapshot();
        assert_eq!(snapshot.lines().len(), 1);
        assert_eq!(snapshot.item_count(), 2);
        assert_eq!(h.backend.calls("add-to-cart"), 1);
        assert_eq!(h.backend.calls("cart-view"), 1);
    }

    #[tokio::test]
    async fn test_add_line_rejects_zero_locally() {
        let h = logged_in().await;
        let err = h
            .cart
            .add_line(ProductId::new("mug"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidQuantity));
        assert_eq!(h.backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_increase_stops_at_stock_limit() {
        let h = logged_in().await;
        let line = h.backend.seed_line("tok", "mug", 3);
        h.cart.fetch_snapshot().await.unwrap();

        let err = h.cart.increase(&line).await.unwrap_err();
        assert!(matches!(err, ClientError::StockLimitExceeded { limit: 3, .. }));
        assert!(err.is_warning());
        assert_eq!(h.backend.calls("update-cart"), 0);
        assert_eq!(quantity(&h.cart, &line), Some(3));
    }

    #[tokio::test]
    async fn test_increase_with_unknown_stock_is_not_refused() {
        let h = logged_in().await;
        let line = h.backend.seed_line("tok", "pin", 40);
        h.cart.fetch_snapshot().await.unwrap();

        h.cart.increase(&line).await.unwrap();
        assert_eq!(quantity(&h.cart, &line), Some(41));
    }

    #[tokio::test]
    async fn test_decrease_from_one_removes_line() {
        let h = logged_in().await;
        let line = h.backend.seed_line("tok", "tee", 1);
        h.cart.fetch_snapshot().await.unwrap();

        h.cart.decrease(&line).await.unwrap();

        assert_eq!(h.backend.calls("delete-cart-line"), 1);
        assert_eq!(h.backend.calls("update-cart"), 0);
        assert!(h.cart.snapshot().line(&line).is_none());
    }

    #[tokio::test]
    async fn test_decrease_above_one_updates() {
        let h = logged_in().await;
        let line = h.backend.seed_line("tok", "tee", 3);
        h.cart.fetch_snapshot().await.unwrap();

        h.cart.decrease(&line).await.unwrap();
        assert_eq!(quantity(&h.cart, &line), Some(2));
    }

    #[tokio::test]
    async fn test_unknown_line() {
        let h = logged_in().await;
        let err = h.cart.increase(&LineId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, ClientError::UnknownLine(_)));
    }

    #[tokio::test]
    async fn test_failed_mutation_still_refetches_and_reenables_line() {
        let h = logged_in().await;
        let line = h.backend.seed_line("tok", "tee", 1);
        h.cart.fetch_snapshot().await.unwrap();
        h.backend
            .fail_next("update-cart", ApiError::Rejected("Out of stock".to_string()));

        let err = h.cart.increase(&line).await.unwrap_err();

        assert!(matches!(err, ClientError::Rejected(_)));
        assert_eq!(h.backend.calls("cart-view"), 2);
        assert!(h.cart.state().pending.is_empty());
        assert_eq!(quantity(&h.cart, &line), Some(1));
    }

    #[tokio::test]
    async fn test_line_is_pending_and_removing_while_in_flight() {
        let h = logged_in().await;
        let line = h.backend.seed_line("tok", "tee", 2);
        h.cart.fetch_snapshot().await.unwrap();
        h.backend.hold("delete-cart-line");

        let cart = h.cart.clone();
        let target = line.clone();
        let task = tokio::spawn(async move { cart.remove(&target).await });
        h.backend.wait_for_held("delete-cart-line", 1).await;

        let state = h.cart.state();
        assert!(state.is_pending(&line));
        assert!(state.removing.contains(&line));
        assert!(state.snapshot.line(&line).is_some());

        let err = h.cart.increase(&line).await.unwrap_err();
        assert!(matches!(err, ClientError::LineBusy(_)));

        h.backend.release("delete-cart-line", 0);
        task.await.unwrap().unwrap();

        let state = h.cart.state();
        assert!(state.pending.is_empty());
        assert!(state.removing.is_empty());
        assert!(state.snapshot.line(&line).is_none());
    }

    #[tokio::test]
    async fn test_different_lines_mutate_concurrently() {
        let h = logged_in().await;
        let a = h.backend.seed_line("tok", "tee", 1);
        let b = h.backend.seed_line("tok", "mug", 1);
        h.cart.fetch_snapshot().await.unwrap();
        h.backend.hold("update-cart");

        let (cart_a, line_a) = (h.cart.clone(), a.clone());
        let (cart_b, line_b) = (h.cart.clone(), b.clone());
        let task_a = tokio::spawn(async move { cart_a.increase(&line_a).await });
        let task_b = tokio::spawn(async move { cart_b.increase(&line_b).await });
        h.backend.wait_for_held("update-cart", 2).await;

        let state = h.cart.state();
        assert!(state.is_pending(&a) && state.is_pending(&b));

        h.backend.release("update-cart", 0);
        h.backend.release("update-cart", 1);
        task_a.await.unwrap().unwrap();
        task_b.await.unwrap().unwrap();

        assert_eq!(quantity(&h.cart, &a), Some(2));
        assert_eq!(quantity(&h.cart, &b), Some(2));
    }

    #[tokio::test]
    async fn test_out_of_order_refetches_last_settled_wins() {
        let h = logged_in().await;
        let a = h.backend.seed_line("tok", "tee", 1);
        let b = h.backend.seed_line("tok", "mug", 1);
        h.cart.fetch_snapshot().await.unwrap();
        h.backend.hold("cart-view");

        let (cart, line) = (h.cart.clone(), a.clone());
        let first = tokio::spawn(async move { cart.increase(&line).await });
        h.backend.wait_for_held("cart-view", 1).await;

        let (cart, line) = (h.cart.clone(), b.clone());
        let second = tokio::spawn(async move { cart.increase(&line).await });
        h.backend.wait_for_held("cart-view", 2).await;

        h.backend.release("cart-view", 1);
        second.await.unwrap().unwrap();
        assert_eq!(quantity(&h.cart, &a), Some(2));
        assert_eq!(quantity(&h.cart, &b), Some(2));
        assert!(h.cart.state().loading);

        // The first re-fetch settles last and only saw its own increase.
        h.backend.release("cart-view", 0);
        first.await.unwrap().unwrap();
        assert_eq!(quantity(&h.cart, &a), Some(2));
        assert_eq!(quantity(&h.cart, &b), Some(1));
        assert!(!h.cart.state().loading);
    }

    #[tokio::test]
    async fn test_result_for_previous_session_is_discarded() {
        let h = logged_in().await;
        h.backend.seed_line("tok", "tee", 1);
        h.backend.hold("cart-view");

        let cart = h.cart.clone();
        let task = tokio::spawn(async move { cart.fetch_snapshot().await });
        h.backend.wait_for_held("cart-view", 1).await;

        h.session.on_external_credential_change(None).await;
        h.backend.release("cart-view", 0);
        task.await.unwrap().unwrap();

        assert_eq!(h.session.status(), SessionStatus::Anonymous);
        assert!(h.cart.snapshot().lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_mutation_expires_session() {
        let h = logged_in().await;
        let line = h.backend.seed_line("tok", "tee", 2);
        h.cart.fetch_snapshot().await.unwrap();
        h.backend.revoke("tok");

        let err = h.cart.decrease(&line).await.unwrap_err();

        assert!(matches!(err, ClientError::SessionExpired));
        assert_eq!(h.session.status(), SessionStatus::Anonymous);
        assert!(h.cart.snapshot().lines().is_empty());
        // The re-fetch after the failed mutation had no credential to use.
        assert_eq!(h.backend.calls("cart-view"), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.navigator.routes(), vec![Route::Login]);
    }

    #[tokio::test]
    async fn test_invalid_lines_are_kept_but_not_counted() {
        let h = logged_in().await;
        h.backend.seed_line("tok", "tee", 2);
        h.backend.seed_orphan_line("tok", 4);
        h.cart.fetch_snapshot().await.unwrap();

        let snapshot = h.cart.snapshot();
        assert_eq!(snapshot.lines().len(), 2);
        assert_eq!(snapshot.invalid_lines().count(), 1);
        assert_eq!(snapshot.item_count(), 2);
    }

    #[tokio::test]
    async fn test_clear_empties_cart() {
        let h = logged_in().await;
        h.backend.seed_line("tok", "tee", 2);
        h.backend.seed_line("tok", "mug", 1);
        h.cart.fetch_snapshot().await.unwrap();

        h.cart.clear().await.unwrap();
        assert!(h.cart.snapshot().lines().is_empty());
    }
}
