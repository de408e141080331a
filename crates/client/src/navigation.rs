//! Navigation seam and liveness tracking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::models::OrderSummary;

/// Surfaces the engine can send the user to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Login form.
    Login,
    /// Cart page (checkout aborted).
    Cart,
    /// Storefront home.
    Home,
    /// Order confirmation after a successful checkout.
    OrderSummary(Box<OrderSummary>),
}

/// Implemented by the host (router, terminal, test recorder).
pub trait Navigator: Send + Sync {
    /// Move the user to `route`.
    fn navigate(&self, route: Route);
}

/// Delayed redirect to the login surface.
///
/// The delay lets the "please log in" message render first. At most one
/// redirect is pending at a time, however many operations fail.
#[derive(Clone)]
pub struct LoginRedirect {
    navigator: Arc<dyn Navigator>,
    delay: Duration,
    pending: Arc<AtomicBool>,
}

impl LoginRedirect {
    /// Create a redirect scheduler.
    #[must_use]
    pub fn new(navigator: Arc<dyn Navigator>, delay: Duration) -> Self {
        Self {
            navigator,
            delay,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Schedule the redirect unless one is already pending.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self) {
        if self.pending.swap(true, Ordering::SeqCst) {
            tracing::debug!("Login redirect already scheduled");
            return;
        }

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.delay).await;
            this.pending.store(false, Ordering::SeqCst);
            tracing::info!("Redirecting to login");
            this.navigator.navigate(Route::Login);
        });
    }

    /// Whether a redirect is waiting for its delay to elapse.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Liveness flag for a surface that may be torn down while requests are in
/// flight. Responses that arrive after [`Liveness::detach`] are dropped.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    detached: Arc<AtomicBool>,
}

impl Liveness {
    /// A live flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the surface is still attached.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.detached.load(Ordering::SeqCst)
    }

    /// Mark the surface as gone. Irreversible.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingNavigator;

    #[tokio::test(start_paused = true)]
    async fn test_redirect_waits_for_delay() {
        let navigator = Arc::new(RecordingNavigator::default());
        let redirect = LoginRedirect::new(navigator.clone(), Duration::from_millis(1500));

        redirect.schedule();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(navigator.routes().is_empty());
        assert!(redirect.is_pending());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(navigator.routes(), vec![Route::Login]);
        assert!(!redirect.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_redirects_are_coalesced() {
        let navigator = Arc::new(RecordingNavigator::default());
        let redirect = LoginRedirect::new(navigator.clone(), Duration::from_millis(100));

        redirect.schedule();
        redirect.schedule();
        redirect.schedule();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(navigator.routes(), vec![Route::Login]);
    }

    #[test]
    fn test_liveness_detach_is_shared() {
        let liveness = Liveness::new();
        let clone = liveness.clone();
        assert!(clone.is_alive());

        liveness.detach();
        assert!(!clone.is_alive());
    }
}
