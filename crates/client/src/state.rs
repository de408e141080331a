//! Engine wiring for one tab.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::api::StorefrontApi;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::{Event, EventBus};
use crate::models::{Coupon, SessionStatus};
use crate::navigation::{LoginRedirect, Navigator};
use crate::payment::PaymentGateway;
use crate::services::checkout::CheckoutContext;
use crate::services::pricing::{self, PricingResult};
use crate::services::{CartEngine, CheckoutFlow, CouponBook, SessionManager};
use crate::storage::{KeyValueStore, keys};

/// Everything one tab needs, wired together.
///
/// This struct is cheaply cloneable via `Arc`. Components are not wired to
/// each other directly: session changes reach the cart through the
/// [`EventBus`], handled by [`dispatch`](Self::dispatch).
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: ClientConfig,
    api: Arc<dyn StorefrontApi>,
    gateway: Arc<dyn PaymentGateway>,
    navigator: Arc<dyn Navigator>,
    store: Arc<dyn KeyValueStore>,
    bus: EventBus,
    session: SessionManager,
    cart: CartEngine,
    coupons: CouponBook,
}

impl Storefront {
    /// Wire the engine to its collaborators.
    #[must_use]
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn StorefrontApi>,
        gateway: Arc<dyn PaymentGateway>,
        navigator: Arc<dyn Navigator>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let bus = EventBus::new();
        let redirect = LoginRedirect::new(Arc::clone(&navigator), config.login_redirect_delay);
        let session =
            SessionManager::new(Arc::clone(&api), Arc::clone(&store), bus.clone(), redirect);
        let cart = CartEngine::new(Arc::clone(&api), session.clone(), bus.clone());
        let coupons = CouponBook::new(Arc::clone(&api), session.clone(), config.coupon_cache_ttl);

        Self {
            inner: Arc::new(StorefrontInner {
                config,
                api,
                gateway,
                navigator,
                store,
                bus,
                session,
                cart,
                coupons,
            }),
        }
    }

    /// Get a reference to the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Get a reference to the session manager.
    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    /// Get a reference to the cart engine.
    #[must_use]
    pub fn cart(&self) -> &CartEngine {
        &self.inner.cart
    }

    /// Get a reference to the coupon lookup.
    #[must_use]
    pub fn coupons(&self) -> &CouponBook {
        &self.inner.coupons
    }

    /// Get a reference to the event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Rehydrate the session, then load the cart.
    ///
    /// A failed cart fetch is logged; the session status is still returned.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> SessionStatus {
        let status = self.inner.session.initialize().await;
        if let Err(e) = self.inner.cart.fetch_snapshot().await {
            tracing::warn!(error = %e, "Initial cart fetch failed");
        }
        status
    }

    /// Totals for the current cart.
    #[must_use]
    pub fn quote(&self, coupon: Option<&Coupon>) -> PricingResult {
        pricing::compute(self.inner.cart.snapshot().lines(), coupon)
    }

    /// Start checkout for the current cart.
    ///
    /// # Errors
    ///
    /// See [`CheckoutFlow::start`].
    pub fn begin_checkout(&self) -> Result<CheckoutFlow, ClientError> {
        CheckoutFlow::start(CheckoutContext {
            api: Arc::clone(&self.inner.api),
            session: self.inner.session.clone(),
            cart: self.inner.cart.clone(),
            coupons: self.inner.coupons.clone(),
            gateway: Arc::clone(&self.inner.gateway),
            navigator: Arc::clone(&self.inner.navigator),
            currency: self.inner.config.currency,
        })
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    /// Handle one event. Failures are logged, never propagated.
    pub async fn dispatch(&self, event: &Event) {
        match event {
            Event::SessionChanged => {
                self.inner.coupons.invalidate_all();
                if let Err(e) = self.inner.cart.on_session_changed().await {
                    tracing::warn!(error = %e, "Cart refresh after session change failed");
                }
            }
            Event::CartChanged => {}
            Event::ExternalLogin { user, credential } => {
                self.inner
                    .session
                    .on_in_process_login(user.clone(), credential.clone());
            }
            Event::Storage(change) if change.key == keys::CREDENTIAL => {
                self.inner
                    .session
                    .on_external_credential_change(change.new_value.as_deref())
                    .await;
            }
            Event::Storage(change) => {
                tracing::debug!(key = %change.key, "Ignoring storage change");
            }
        }
    }

    /// Spawn the event loop and the storage bridge.
    ///
    /// Events are handled one at a time, in order. If the loop falls behind
    /// and events are dropped, the cart is re-fetched to resync.
    #[must_use]
    pub fn start(&self) -> EventLoopHandle {
        let mut events = self.inner.bus.subscribe();
        let bridge = self.inner.bus.bridge(self.inner.store.as_ref());
        let (stop, mut stopped) = watch::channel(false);
        let this = self.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    received = events.recv() => match received {
                        Ok(event) => this.dispatch(&event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Event loop lagged; resyncing cart");
                            if let Err(e) = this.inner.cart.fetch_snapshot().await {
                                tracing::warn!(error = %e, "Cart resync failed");
                            }
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!("Event loop stopped");
        });

        EventLoopHandle { stop, task, bridge }
    }
}

/// Running event loop. Dropping it leaves the loop running.
pub struct EventLoopHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    bridge: JoinHandle<()>,
}

impl EventLoopHandle {
    /// Stop the loop and the storage bridge.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Event loop task failed");
        }
        self.bridge.abort();
    }
}
