//! Checkout flow error types.

use thiserror::Error;

/// Transitions the checkout flow refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// A forward jump past a step that has not been validated.
    #[error("cannot skip ahead to a later checkout step")]
    SkipAhead,

    /// An order submission is already in flight.
    #[error("order submission already in progress")]
    SubmissionInProgress,

    /// The cart has no valid lines.
    #[error("cart is empty")]
    EmptyCart,

    /// The flow already succeeded or was aborted.
    #[error("checkout is finished")]
    Finished,

    /// Coupons can only change on the shipping and payment steps, before the
    /// order is placed.
    #[error("coupon cannot be changed now")]
    CouponUnavailable,

    /// The order exists, so its payment method is fixed.
    #[error("payment method is locked once the order is placed")]
    PaymentMethodLocked,

    /// The surface that owned the flow is gone.
    #[error("checkout was closed")]
    Detached,
}

impl CheckoutError {
    /// Message safe to show in the UI.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::SkipAhead => "Please complete the current step first.",
            Self::SubmissionInProgress => "Your order is being placed.",
            Self::EmptyCart => "Your cart is empty.",
            Self::Finished => "This checkout has already finished.",
            Self::CouponUnavailable => "Coupons can't be changed at this point.",
            Self::PaymentMethodLocked => {
                "Your order has been placed; the payment method can no longer change."
            }
            Self::Detached => "Checkout was closed.",
        }
    }
}
