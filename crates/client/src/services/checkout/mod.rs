//! Checkout State Machine.
//!
//! Drives one purchase attempt: `PersonalInfo → ShippingAddress → Payment →
//! Confirmation → Succeeded`, with free backward moves and an `Aborted`
//! exit back to the cart.
//!
//! Entering `Confirmation` places the order exactly once. Card payments then
//! run the gateway leg: create an intent for the order total, confirm it with
//! the gateway, and bind it to the order with `confirm-payment`. A failed
//! payment leaves the order placed but unpaid; retrying reuses it.

mod draft;
mod error;
mod validation;

pub use draft::{CheckoutDraft, CheckoutForm, CheckoutStep, PendingOrder};
pub use error::CheckoutError;
pub use validation::{FieldError, ValidationErrors};

use std::sync::Arc;

use cartwheel_core::{CurrencyCode, Money, PaymentStatus};
use tokio::sync::watch;
use tracing::instrument;

use crate::api::{
    ApiError, ConfirmPaymentRequest, CreateOrderRequest, CustomerInfo, PaymentIntentRequest,
    StorefrontApi,
};
use crate::error::{ClientError, add_breadcrumb};
use crate::models::{OrderItem, OrderSummary, SessionTicket};
use crate::navigation::{Liveness, Navigator, Route};
use crate::payment::{BillingDetails, GatewayError, IntentStatus, PaymentGateway};
use crate::services::cart::CartEngine;
use crate::services::coupons::CouponBook;
use crate::services::pricing::{self, PricingResult};
use crate::services::session::SessionManager;

/// Collaborators a checkout attempt needs.
#[derive(Clone)]
pub struct CheckoutContext {
    pub api: Arc<dyn StorefrontApi>,
    pub session: SessionManager,
    pub cart: CartEngine,
    pub coupons: CouponBook,
    pub gateway: Arc<dyn PaymentGateway>,
    pub navigator: Arc<dyn Navigator>,
    pub currency: CurrencyCode,
}

/// One checkout attempt.
///
/// Cheap to clone; clones drive the same draft. Call
/// [`teardown`](Self::teardown) when the owning surface goes away.
#[derive(Clone)]
pub struct CheckoutFlow {
    inner: Arc<FlowInner>,
}

struct FlowInner {
    ctx: CheckoutContext,
    draft: watch::Sender<CheckoutDraft>,
    liveness: Liveness,
}

impl CheckoutFlow {
    /// Start checkout for the current cart.
    ///
    /// Personal info is prefilled from the session's user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AuthRequired` without a verified session and
    /// `CheckoutError::EmptyCart` when the cart has no valid lines.
    pub fn start(ctx: CheckoutContext) -> Result<Self, ClientError> {
        ctx.session.require_credential()?;
        if ctx.cart.snapshot().is_empty() {
            return Err(CheckoutError::EmptyCart.into());
        }

        let mut draft = CheckoutDraft::default();
        if let Some(user) = ctx.session.user() {
            let info = &mut draft.form.personal_info;
            let (first, last) = user.name.trim().split_once(' ').unwrap_or((user.name.trim(), ""));
            first.clone_into(&mut info.first_name);
            last.trim().clone_into(&mut info.last_name);
            info.email.clone_from(&user.email);
        }

        add_breadcrumb("checkout", "Checkout started", None);
        tracing::info!("Checkout started");

        let (draft, _) = watch::channel(draft);
        Ok(Self {
            inner: Arc::new(FlowInner {
                ctx,
                draft,
                liveness: Liveness::new(),
            }),
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current draft.
    #[must_use]
    pub fn draft(&self) -> CheckoutDraft {
        self.inner.draft.borrow().clone()
    }

    /// Current step.
    #[must_use]
    pub fn step(&self) -> CheckoutStep {
        self.inner.draft.borrow().step
    }

    /// Watch the draft. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CheckoutDraft> {
        self.inner.draft.subscribe()
    }

    /// Totals for the current cart and coupon.
    #[must_use]
    pub fn pricing(&self) -> PricingResult {
        let coupon = self.inner.draft.borrow().coupon.clone();
        pricing::compute(self.inner.ctx.cart.snapshot().lines(), coupon.as_ref())
    }

    // =========================================================================
    // Form and navigation
    // =========================================================================

    /// Change form fields.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::PaymentMethodLocked` if `f` changes the
    /// payment method after the order was placed; the edit is then dropped.
    pub fn edit(&self, f: impl FnOnce(&mut CheckoutForm)) -> Result<(), ClientError> {
        self.ensure_open()?;

        let mut form = self.inner.draft.borrow().form.clone();
        f(&mut form);

        let mut outcome = Ok(());
        self.inner.draft.send_modify(|draft| {
            if draft.order.is_some() && draft.form.payment_method != form.payment_method {
                outcome = Err(CheckoutError::PaymentMethodLocked.into());
            } else {
                draft.form = form;
            }
        });
        outcome
    }

    /// Validate the current step and move to the next one.
    ///
    /// Leaving `Payment` enters `Confirmation` and submits the order;
    /// advancing from `Confirmation` retries the submission.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` with every invalid field of the
    /// step, or whatever [`submit`](Self::submit) returns.
    #[instrument(skip(self), fields(step = %self.step()))]
    pub async fn advance(&self) -> Result<CheckoutStep, ClientError> {
        self.ensure_open()?;

        let (step, form) = {
            let draft = self.inner.draft.borrow();
            (draft.step, draft.form.clone())
        };

        let next = match step {
            CheckoutStep::PersonalInfo => {
                validation::validate_personal_info(&form.personal_info)
                    .map_err(ClientError::Validation)?;
                CheckoutStep::ShippingAddress
            }
            CheckoutStep::ShippingAddress => {
                validation::validate_addresses(&form).map_err(ClientError::Validation)?;
                CheckoutStep::Payment
            }
            CheckoutStep::Payment => {
                validation::validate_payment(&form).map_err(ClientError::Validation)?;
                CheckoutStep::Confirmation
            }
            CheckoutStep::Confirmation => {
                self.submit().await?;
                return Ok(self.step());
            }
            CheckoutStep::Succeeded | CheckoutStep::Aborted => {
                return Err(CheckoutError::Finished.into());
            }
        };

        self.set_step(next);
        if next == CheckoutStep::Confirmation {
            self.submit().await?;
        }
        Ok(self.step())
    }

    /// Move back one step. Entered data is kept.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::SubmissionInProgress` while the order is being
    /// placed.
    pub fn back(&self) -> Result<CheckoutStep, ClientError> {
        self.ensure_open()?;
        if self.inner.draft.borrow().submitting {
            return Err(CheckoutError::SubmissionInProgress.into());
        }
        if let Some(previous) = self.step().previous() {
            self.set_step(previous);
        }
        Ok(self.step())
    }

    /// Jump to an earlier (or the current) step.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::SkipAhead` for any later step; forward moves
    /// only happen through [`advance`](Self::advance).
    pub fn go_to(&self, target: CheckoutStep) -> Result<(), ClientError> {
        self.ensure_open()?;
        if target > self.step() {
            tracing::debug!(target = %target, "Refusing to skip ahead");
            return Err(CheckoutError::SkipAhead.into());
        }
        if self.inner.draft.borrow().submitting {
            return Err(CheckoutError::SubmissionInProgress.into());
        }
        self.set_step(target);
        Ok(())
    }

    fn set_step(&self, step: CheckoutStep) {
        let changed = self.inner.draft.send_if_modified(|draft| {
            let changed = draft.step != step;
            draft.step = step;
            changed
        });
        if changed {
            add_breadcrumb("checkout", "Step changed", Some(&[("step", step.to_string().as_str())]));
            tracing::debug!(step = %step, "Checkout step changed");
        }
    }

    // =========================================================================
    // Coupons
    // =========================================================================

    fn ensure_coupon_editable(&self) -> Result<(), ClientError> {
        self.ensure_open()?;
        let draft = self.inner.draft.borrow();
        let editable = matches!(
            draft.step,
            CheckoutStep::ShippingAddress | CheckoutStep::Payment
        ) && draft.order.is_none();
        if editable {
            Ok(())
        } else {
            Err(CheckoutError::CouponUnavailable.into())
        }
    }

    /// Replace the active coupon with `code`.
    ///
    /// The previous coupon is removed before the new code is looked up, so a
    /// rejected code leaves no discount.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::CouponUnavailable` outside the shipping and
    /// payment steps, or the lookup error.
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, code: &str) -> Result<PricingResult, ClientError> {
        self.ensure_coupon_editable()?;
        self.inner.draft.send_modify(|draft| draft.coupon = None);

        let coupon = self.inner.ctx.coupons.resolve(code).await?;
        self.ensure_alive()?;
        self.ensure_coupon_editable()?;

        add_breadcrumb("checkout", "Coupon applied", Some(&[("code", coupon.code.as_str())]));
        self.inner.draft.send_modify(|draft| draft.coupon = Some(coupon));
        Ok(self.pricing())
    }

    /// Remove the active coupon.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::CouponUnavailable` outside the shipping and
    /// payment steps.
    pub fn remove_coupon(&self) -> Result<PricingResult, ClientError> {
        self.ensure_coupon_editable()?;
        self.inner.draft.send_modify(|draft| draft.coupon = None);
        Ok(self.pricing())
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Place the order (once) and, for card payments, pay for it.
    ///
    /// On success the flow is `Succeeded`, the cart is re-fetched and the
    /// navigator is sent to the order summary.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if an earlier step was edited into
    /// an invalid state (the flow moves back to that step),
    /// `CheckoutError::SubmissionInProgress` for a duplicate call,
    /// `ClientError::Payment` when the gateway does not capture the payment
    /// (the order stays placed and the flow stays in `Confirmation`), and
    /// `CheckoutError::Detached` if the flow was torn down meanwhile.
    #[instrument(skip(self))]
    pub async fn submit(&self) -> Result<OrderSummary, ClientError> {
        self.ensure_open()?;
        if self.step() != CheckoutStep::Confirmation {
            return Err(CheckoutError::SkipAhead.into());
        }

        let form = self.inner.draft.borrow().form.clone();
        self.revalidate(&form)?;

        let _submitting = SubmittingGuard::acquire(self)?;
        let ticket = self.inner.ctx.session.require_credential()?;

        let existing = self.inner.draft.borrow().order.clone();
        let order = match existing {
            Some(order) => {
                tracing::info!(order_number = %order.placed.order_number, "Retrying payment for placed order");
                order
            }
            None => self.place_order(&ticket, &form).await?,
        };

        let payment_status = if form.payment_method.is_card_based() {
            self.pay(&ticket, &form, &order).await?;
            PaymentStatus::Paid
        } else {
            PaymentStatus::Unpaid
        };

        let summary = OrderSummary {
            order_id: order.placed.order_id.clone(),
            order_number: order.placed.order_number.clone(),
            total: order.total,
            items: order.items.clone(),
            status: order.placed.status,
            payment_status,
        };
        self.finish(summary.clone()).await;
        Ok(summary)
    }

    /// Every step's rules, checked again on the form about to be sent.
    fn revalidate(&self, form: &CheckoutForm) -> Result<(), ClientError> {
        let checks = [
            (CheckoutStep::PersonalInfo, validation::validate_personal_info(&form.personal_info)),
            (CheckoutStep::ShippingAddress, validation::validate_addresses(form)),
            (CheckoutStep::Payment, validation::validate_payment(form)),
        ];
        for (step, result) in checks {
            if let Err(errors) = result {
                tracing::info!(step = %step, "Checkout form no longer valid; moving back");
                self.set_step(step);
                return Err(ClientError::Validation(errors));
            }
        }
        Ok(())
    }

    async fn place_order(
        &self,
        ticket: &SessionTicket,
        form: &CheckoutForm,
    ) -> Result<PendingOrder, ClientError> {
        let snapshot = self.inner.ctx.cart.snapshot();
        if snapshot.is_empty() {
            return Err(CheckoutError::EmptyCart.into());
        }

        let coupon = self.inner.draft.borrow().coupon.clone();
        let totals = pricing::compute(snapshot.lines(), coupon.as_ref());
        let items: Vec<OrderItem> = snapshot.valid_lines().filter_map(OrderItem::from_line).collect();

        let request = CreateOrderRequest {
            shipping_address: form.shipping_address.clone(),
            billing_address: form.billing().clone(),
            payment_method: form.payment_method,
            coupon_code: coupon.map(|c| c.code),
            notes: form.notes(),
        };

        let result = self.inner.ctx.api.create_order(ticket.credential(), &request).await;
        let placed = self.inner.ctx.session.guard(ticket, result)?;
        self.ensure_alive()?;

        add_breadcrumb("checkout", "Order placed", Some(&[("order_number", placed.order_number.as_str())]));
        tracing::info!(order_number = %placed.order_number, total = %totals.total, "Order placed");

        let order = PendingOrder {
            placed,
            total: Money::new(totals.total, self.inner.ctx.currency),
            items,
        };
        self.inner
            .draft
            .send_modify(|draft| draft.order = Some(order.clone()));
        Ok(order)
    }

    async fn pay(
        &self,
        ticket: &SessionTicket,
        form: &CheckoutForm,
        order: &PendingOrder,
    ) -> Result<(), ClientError> {
        let ctx = &self.inner.ctx;
        let amount = order
            .total
            .minor_units()
            .ok_or(ClientError::Network(ApiError::MissingData("amount")))?;

        let request = PaymentIntentRequest {
            amount,
            currency: ctx.currency.code().to_string(),
            order_id: order.placed.order_id.clone(),
            customer_info: CustomerInfo {
                name: form.personal_info.full_name(),
                email: form.personal_info.email.trim().to_owned(),
                phone: form.personal_info.phone.trim().to_owned(),
            },
        };
        let result = ctx.api.create_payment_intent(ticket.credential(), &request).await;
        let intent = ctx.session.guard(ticket, result)?;
        self.ensure_alive()?;

        let billing = BillingDetails::new(&form.personal_info, form.billing());
        let confirmed = ctx
            .gateway
            .confirm_card_payment(&intent.client_secret, &form.card, &billing)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Card payment failed"))?;
        self.ensure_alive()?;

        if confirmed.status != IntentStatus::Succeeded {
            tracing::warn!(status = %confirmed.status, "Card payment not completed");
            return Err(GatewayError::Incomplete(confirmed.status).into());
        }

        let result = ctx
            .api
            .confirm_payment(ticket.credential(), &ConfirmPaymentRequest {
                payment_intent_id: confirmed.intent_id,
                order_id: order.placed.order_id.clone(),
            })
            .await;
        ctx.session.guard(ticket, result)?;
        self.ensure_alive()?;

        add_breadcrumb("checkout", "Payment confirmed", Some(&[("last4", form.card.last4().as_str())]));
        Ok(())
    }

    async fn finish(&self, summary: OrderSummary) {
        self.set_step(CheckoutStep::Succeeded);
        tracing::info!(order_number = %summary.order_number, "Checkout succeeded");

        if let Err(e) = self.inner.ctx.cart.fetch_snapshot().await {
            tracing::warn!(error = %e, "Failed to refresh cart after checkout");
        }
        if self.inner.liveness.is_alive() {
            self.inner
                .ctx
                .navigator
                .navigate(Route::OrderSummary(Box::new(summary)));
        }
    }

    // =========================================================================
    // Exit
    // =========================================================================

    /// Leave checkout for the cart. The draft is discarded.
    pub fn abort(&self) {
        if self.step().is_finished() || !self.inner.liveness.is_alive() {
            return;
        }
        self.set_step(CheckoutStep::Aborted);
        self.inner.liveness.detach();
        tracing::info!("Checkout aborted");
        self.inner.ctx.navigator.navigate(Route::Cart);
    }

    /// The owning surface is gone. Responses still in flight will not touch
    /// the draft.
    pub fn teardown(&self) {
        self.inner.liveness.detach();
    }

    fn ensure_alive(&self) -> Result<(), ClientError> {
        if self.inner.liveness.is_alive() {
            Ok(())
        } else {
            tracing::debug!("Checkout detached; dropping response");
            Err(CheckoutError::Detached.into())
        }
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        self.ensure_alive()?;
        if self.step().is_finished() {
            return Err(CheckoutError::Finished.into());
        }
        Ok(())
    }
}

/// Holds the draft's submitting flag for the duration of a submission.
struct SubmittingGuard<'a> {
    flow: &'a CheckoutFlow,
}

impl<'a> SubmittingGuard<'a> {
    fn acquire(flow: &'a CheckoutFlow) -> Result<Self, ClientError> {
        let acquired = flow.inner.draft.send_if_modified(|draft| {
            if draft.submitting {
                return false;
            }
            draft.submitting = true;
            true
        });
        if acquired {
            Ok(Self { flow })
        } else {
            Err(CheckoutError::SubmissionInProgress.into())
        }
    }
}

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        self.flow
            .inner
            .draft
            .send_modify(|draft| draft.submitting = false);
    }
}
