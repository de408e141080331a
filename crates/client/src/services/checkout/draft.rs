//! Checkout draft: the in-progress purchase form and its step.

use std::fmt;

use cartwheel_core::Money;

use crate::models::{Address, Coupon, OrderItem, PaymentMethod, PersonalInfo, PlacedOrder};
use crate::payment::CardDetails;

/// Checkout steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum CheckoutStep {
    #[default]
    PersonalInfo,
    ShippingAddress,
    Payment,
    /// The order is placed and, for cards, paid from here.
    Confirmation,
    /// Terminal.
    Succeeded,
    /// Left checkout for the cart. Terminal for this draft.
    Aborted,
}

impl CheckoutStep {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Aborted)
    }

    /// The step before this one, if going back is possible.
    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        match self {
            Self::ShippingAddress => Some(Self::PersonalInfo),
            Self::Payment => Some(Self::ShippingAddress),
            Self::Confirmation => Some(Self::Payment),
            Self::PersonalInfo | Self::Succeeded | Self::Aborted => None,
        }
    }
}

impl fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PersonalInfo => "personal_info",
            Self::ShippingAddress => "shipping_address",
            Self::Payment => "payment",
            Self::Confirmation => "confirmation",
            Self::Succeeded => "succeeded",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Everything the buyer types in.
#[derive(Debug, Clone)]
pub struct CheckoutForm {
    pub personal_info: PersonalInfo,
    pub shipping_address: Address,
    /// When set, `billing_address` is ignored.
    pub billing_same_as_shipping: bool,
    pub billing_address: Address,
    pub payment_method: PaymentMethod,
    pub card: CardDetails,
    pub notes: String,
}

impl Default for CheckoutForm {
    fn default() -> Self {
        Self {
            personal_info: PersonalInfo::default(),
            shipping_address: Address::default(),
            billing_same_as_shipping: true,
            billing_address: Address::default(),
            payment_method: PaymentMethod::default(),
            card: CardDetails::new("", "", "", ""),
            notes: String::new(),
        }
    }
}

impl CheckoutForm {
    /// Address to bill.
    #[must_use]
    pub const fn billing(&self) -> &Address {
        if self.billing_same_as_shipping {
            &self.shipping_address
        } else {
            &self.billing_address
        }
    }

    /// Order notes, if any were entered.
    #[must_use]
    pub fn notes(&self) -> Option<String> {
        let notes = self.notes.trim();
        (!notes.is_empty()).then(|| notes.to_owned())
    }
}

/// An order created by this checkout, possibly still unpaid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOrder {
    pub placed: PlacedOrder,
    /// Total charged, fixed when the order was placed.
    pub total: Money,
    pub items: Vec<OrderItem>,
}

/// The checkout attempt's state.
#[derive(Debug, Clone, Default)]
pub struct CheckoutDraft {
    pub step: CheckoutStep,
    pub form: CheckoutForm,
    /// Active coupon. Applying a new one replaces it.
    pub coupon: Option<Coupon>,
    /// Set once `create-order` succeeded.
    pub order: Option<PendingOrder>,
    /// Whether an order submission is in flight.
    pub submitting: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_ordered() {
        assert!(CheckoutStep::PersonalInfo < CheckoutStep::ShippingAddress);
        assert!(CheckoutStep::Payment < CheckoutStep::Confirmation);
        assert_eq!(
            CheckoutStep::Confirmation.previous(),
            Some(CheckoutStep::Payment)
        );
        assert_eq!(CheckoutStep::PersonalInfo.previous(), None);
        assert!(CheckoutStep::Aborted.is_finished());
    }

    #[test]
    fn test_billing_defaults_to_shipping() {
        let mut form = CheckoutForm::default();
        form.shipping_address.city = "Springfield".to_string();
        form.billing_address.city = "Shelbyville".to_string();
        assert_eq!(form.billing().city, "Springfield");

        form.billing_same_as_shipping = false;
        assert_eq!(form.billing().city, "Shelbyville");
    }

    #[test]
    fn test_blank_notes_are_omitted() {
        let form = CheckoutForm {
            notes: "  ".to_string(),
            ..CheckoutForm::default()
        };
        assert_eq!(form.notes(), None);
    }
}
