//! Pricing & discount calculator.
//!
//! One pure function, [`compute`], shared by every surface that shows
//! totals. Amounts are in the store currency's standard unit.

use rust_decimal::Decimal;

use crate::models::{CartLine, Coupon, CouponKind};

/// Orders above this subtotal ship free.
pub const FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Shipping fee at or below the threshold.
pub const FLAT_SHIPPING_FEE: Decimal = Decimal::from_parts(1_500, 0, 0, false, 0);

/// Flat tax rate applied to the subtotal.
pub const TAX_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 2);

/// Decimal places kept for derived amounts.
const MONEY_DP: u32 = 2;

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Totals derived from a cart and an optional coupon. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PricingResult {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    /// Units across valid lines.
    pub line_count: u32,
}

/// Price `lines` with `coupon`.
///
/// Invalid lines are ignored. The total never goes below zero. The result
/// depends only on the arguments.
#[must_use]
pub fn compute(lines: &[CartLine], coupon: Option<&Coupon>) -> PricingResult {
    let (subtotal, line_count) = lines
        .iter()
        .filter_map(|line| line.line_total().map(|total| (total, line.quantity)))
        .fold((Decimal::ZERO, 0_u32), |(sum, count), (total, quantity)| {
            (sum + total, count.saturating_add(quantity))
        });

    let shipping = if subtotal > FREE_SHIPPING_THRESHOLD {
        Decimal::ZERO
    } else {
        FLAT_SHIPPING_FEE
    };

    let tax = (subtotal * TAX_RATE).round_dp(MONEY_DP);
    let discount = coupon.map_or(Decimal::ZERO, |c| discount_for(c, subtotal));
    let total = (subtotal + shipping + tax - discount).max(Decimal::ZERO);

    PricingResult {
        subtotal,
        shipping,
        tax,
        discount,
        total,
        line_count,
    }
}

fn discount_for(coupon: &Coupon, subtotal: Decimal) -> Decimal {
    let value = coupon.value.max(Decimal::ZERO);
    let discount = match coupon.kind {
        CouponKind::Percentage => subtotal * value / ONE_HUNDRED,
        CouponKind::Fixed => value.min(subtotal * coupon.cap_fraction_of_subtotal),
    };
    discount.round_dp(MONEY_DP)
}

#[cfg(test)]
mod tests {
    use cartwheel_core::{LineId, ProductId};

    use super::*;

    fn line(id: &str, price: i64, quantity: u32) -> CartLine {
        CartLine {
            line_id: LineId::new(id),
            product_id: Some(ProductId::new(format!("p-{id}"))),
            name: Some(format!("Product {id}")),
            image_url: None,
            unit_price: Some(Decimal::from(price)),
            stock_limit: Some(10),
            quantity,
        }
    }

    #[test]
    fn test_free_shipping_above_threshold() {
        let lines = vec![line("a", 5_000, 2), line("b", 2_000, 1)];
        let result = compute(&lines, None);

        assert_eq!(result.subtotal, Decimal::from(12_000));
        assert_eq!(result.shipping, Decimal::ZERO);
        assert_eq!(result.tax, Decimal::from(960));
        assert_eq!(result.discount, Decimal::ZERO);
        assert_eq!(result.total, Decimal::from(12_960));
        assert_eq!(result.line_count, 3);
    }

    #[test]
    fn test_flat_shipping_below_threshold() {
        let result = compute(&[line("a", 2_500, 2)], None);

        assert_eq!(result.subtotal, Decimal::from(5_000));
        assert_eq!(result.shipping, Decimal::from(1_500));
        assert_eq!(result.tax, Decimal::from(400));
        assert_eq!(result.total, Decimal::from(6_900));
    }

    #[test]
    fn test_threshold_itself_pays_shipping() {
        let result = compute(&[line("a", 10_000, 1)], None);
        assert_eq!(result.shipping, FLAT_SHIPPING_FEE);
    }

    #[test]
    fn test_fixed_coupon_is_capped_at_half_subtotal() {
        let coupon = Coupon::fixed("half", Decimal::from(50));
        let result = compute(&[line("a", 80, 1)], Some(&coupon));
        assert_eq!(result.discount, Decimal::from(40));
    }

    #[test]
    fn test_fixed_coupon_below_cap_applies_in_full() {
        let coupon = Coupon::fixed("ten", Decimal::from(10));
        let result = compute(&[line("a", 80, 1)], Some(&coupon));
        assert_eq!(result.discount, Decimal::from(10));
    }

    #[test]
    fn test_percentage_coupon() {
        let coupon = Coupon::percentage("twenty", Decimal::from(20));
        let result = compute(&[line("a", 1_000, 1)], Some(&coupon));

        assert_eq!(result.discount, Decimal::from(200));
        assert_eq!(
            result.total,
            Decimal::from(1_000) + result.shipping + result.tax - Decimal::from(200)
        );
        assert_eq!(result.total, Decimal::from(2_380));
    }

    #[test]
    fn test_invalid_lines_are_ignored() {
        let mut broken = line("b", 999, 3);
        broken.unit_price = None;
        let mut orphan = line("c", 999, 3);
        orphan.product_id = None;

        let result = compute(&[line("a", 100, 1), broken, orphan], None);
        assert_eq!(result.subtotal, Decimal::from(100));
        assert_eq!(result.line_count, 1);
    }

    #[test]
    fn test_total_is_never_negative() {
        let coupon = Coupon::percentage("all", Decimal::from(500));
        let result = compute(&[line("a", 20_000, 1)], Some(&coupon));
        assert_eq!(result.total, Decimal::ZERO);
    }

    #[test]
    fn test_total_identity_holds_across_inputs() {
        let coupons = [
            None,
            Some(Coupon::fixed("f", Decimal::from(30))),
            Some(Coupon::fixed("big", Decimal::from(1_000_000))),
            Some(Coupon::percentage("p", Decimal::new(125, 1))),
            Some(Coupon::percentage("p100", Decimal::from(100))),
        ];
        let carts = [
            vec![],
            vec![line("a", 1, 1)],
            vec![line("a", 80, 1)],
            vec![line("a", 3_333, 3), line("b", 1, 7)],
            vec![line("a", 10_001, 1)],
        ];

        for cart in &carts {
            for coupon in &coupons {
                let r = compute(cart, coupon.as_ref());
                assert_eq!(
                    r.total,
                    (r.subtotal + r.shipping + r.tax - r.discount).max(Decimal::ZERO)
                );
                if let Some(c) = coupon
                    && c.kind == CouponKind::Fixed
                {
                    assert!(r.discount <= r.subtotal * Decimal::new(5, 1));
                }
                assert_eq!(compute(cart, coupon.as_ref()), r);
            }
        }
    }
}
