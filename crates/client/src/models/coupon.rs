//! Coupon types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fixed discounts never exceed this fraction of the subtotal.
pub const DEFAULT_CAP_FRACTION: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Discount rule kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponKind {
    /// `value` percent of the subtotal.
    Percentage,
    /// `value` off, capped at a fraction of the subtotal.
    Fixed,
}

/// A named discount rule. At most one is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    /// Normalized code.
    pub code: String,
    /// Rule kind.
    #[serde(alias = "discountType", alias = "type")]
    pub kind: CouponKind,
    /// Percent or amount, depending on `kind`.
    #[serde(alias = "discountValue", alias = "discount")]
    pub value: Decimal,
    /// Cap for fixed coupons, as a fraction of the subtotal.
    #[serde(default = "default_cap_fraction")]
    pub cap_fraction_of_subtotal: Decimal,
}

const fn default_cap_fraction() -> Decimal {
    DEFAULT_CAP_FRACTION
}

impl Coupon {
    /// Percentage coupon.
    #[must_use]
    pub fn percentage(code: &str, percent: Decimal) -> Self {
        Self {
            code: normalize_code(code).unwrap_or_default(),
            kind: CouponKind::Percentage,
            value: percent,
            cap_fraction_of_subtotal: DEFAULT_CAP_FRACTION,
        }
    }

    /// Fixed-amount coupon.
    #[must_use]
    pub fn fixed(code: &str, amount: Decimal) -> Self {
        Self {
            code: normalize_code(code).unwrap_or_default(),
            kind: CouponKind::Fixed,
            value: amount,
            cap_fraction_of_subtotal: DEFAULT_CAP_FRACTION,
        }
    }
}

/// Trim and upper-case a user-entered code. `None` if nothing is left.
#[must_use]
pub fn normalize_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_uppercase())
    }
}
