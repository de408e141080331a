//! Cart snapshot types.
//!
//! The backend owns the cart. A [`CartSnapshot`] is always the latest value
//! it returned and is never patched locally.

use cartwheel_core::{LineId, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Wire types
// =============================================================================

/// A cart line as the backend sends it. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCartLine {
    /// Line ID.
    #[serde(default, alias = "_id", alias = "lineId")]
    pub id: Option<LineId>,
    /// Product the line refers to; `None` if the product was deleted.
    #[serde(default)]
    pub product: Option<RawProduct>,
    /// Requested quantity.
    #[serde(default)]
    pub quantity: Option<i64>,
}

/// Product reference embedded in a cart line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProduct {
    /// Product ID.
    #[serde(default, alias = "_id")]
    pub id: Option<ProductId>,
    /// Product name.
    #[serde(default)]
    pub name: Option<String>,
    /// Unit price in the store currency.
    #[serde(default, alias = "unitPrice")]
    pub price: Option<Decimal>,
    /// Units in stock.
    #[serde(default, alias = "stockLimit", alias = "countInStock")]
    pub stock: Option<i64>,
    /// Main image URL.
    #[serde(default)]
    pub image: Option<String>,
}

// =============================================================================
// Normalized types
// =============================================================================

/// A normalized cart line.
///
/// Lines missing a product reference, a unit price or a positive quantity
/// are kept (so the UI can flag them) but are not [valid](Self::is_valid)
/// and never reach pricing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    /// Line ID.
    pub line_id: LineId,
    /// Product ID.
    pub product_id: Option<ProductId>,
    /// Product name for display.
    pub name: Option<String>,
    /// Product image for display.
    pub image_url: Option<String>,
    /// Unit price.
    pub unit_price: Option<Decimal>,
    /// Units the backend will sell; `None` when unknown.
    pub stock_limit: Option<u32>,
    /// Quantity in the cart; 0 when missing or not positive.
    pub quantity: u32,
}

impl CartLine {
    /// Normalize a wire line. Lines without an ID cannot be addressed and are
    /// rejected.
    #[must_use]
    pub fn from_raw(raw: RawCartLine) -> Option<Self> {
        let line_id = raw.id?;
        let product = raw.product.unwrap_or_default();

        Some(Self {
            line_id,
            product_id: product.id,
            name: product.name,
            image_url: product.image,
            unit_price: product.price.filter(|p| !p.is_sign_negative()),
            stock_limit: product.stock.map(clamp_count),
            quantity: raw.quantity.map_or(0, clamp_count),
        })
    }

    /// Whether the line has everything pricing needs.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.product_id.is_some() && self.unit_price.is_some() && self.quantity > 0
    }

    /// `unit_price * quantity`, for valid lines.
    #[must_use]
    pub fn line_total(&self) -> Option<Decimal> {
        if !self.is_valid() {
            return None;
        }
        self.unit_price.map(|price| price * Decimal::from(self.quantity))
    }

    /// Whether one more unit would exceed the known stock.
    #[must_use]
    pub fn at_stock_limit(&self) -> bool {
        self.stock_limit.is_some_and(|limit| self.quantity >= limit)
    }
}

fn clamp_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Ordered cart lines, exactly as last returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartSnapshot {
    lines: Vec<CartLine>,
}

impl CartSnapshot {
    /// Build a snapshot from wire lines.
    #[must_use]
    pub fn from_raw(raw: Vec<RawCartLine>) -> Self {
        let total = raw.len();
        let lines: Vec<CartLine> = raw.into_iter().filter_map(CartLine::from_raw).collect();
        if lines.len() < total {
            tracing::warn!(
                dropped = total - lines.len(),
                "Cart lines without an ID were dropped"
            );
        }
        Self { lines }
    }

    /// Build a snapshot from already-normalized lines.
    #[must_use]
    pub const fn from_lines(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    /// All lines, including invalid ones.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Lines that pass the cart line invariant.
    pub fn valid_lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.iter().filter(|line| line.is_valid())
    }

    /// Lines that fail it (for anomaly display).
    pub fn invalid_lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.iter().filter(|line| !line.is_valid())
    }

    /// Find a line by ID.
    #[must_use]
    pub fn line(&self, line_id: &LineId) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.line_id == line_id)
    }

    /// Whether the cart has no valid line.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.valid_lines().next().is_none()
    }

    /// Total units across valid lines (header badge).
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.valid_lines()
            .fold(0_u32, |count, line| count.saturating_add(line.quantity))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_backend_shape() {
        let json = r#"[
            {"_id": "l1", "product": {"_id": "p1", "name": "Mug", "price": 12.5, "countInStock": 4}, "quantity": 2},
            {"_id": "l2", "product": null, "quantity": 1},
            {"_id": "l3", "product": {"_id": "p3", "price": "3.00"}, "quantity": 0}
        ]"#;
        let raw: Vec<RawCartLine> = serde_json::from_str(json).unwrap();
        let snapshot = CartSnapshot::from_raw(raw);

        assert_eq!(snapshot.lines().len(), 3);
        let mug = snapshot.line(&LineId::new("l1")).unwrap();
        assert_eq!(mug.unit_price, Some(Decimal::new(125, 1)));
        assert_eq!(mug.stock_limit, Some(4));
        assert_eq!(mug.line_total(), Some(Decimal::from(25)));

        let valid: Vec<_> = snapshot.valid_lines().map(|l| l.line_id.as_str()).collect();
        assert_eq!(valid, vec!["l1"]);
        assert_eq!(snapshot.invalid_lines().count(), 2);
        assert_eq!(snapshot.item_count(), 2);
    }

    #[test]
    fn test_lines_without_id_are_dropped() {
        let raw = vec![
            RawCartLine {
                id: None,
                product: None,
                quantity: Some(1),
            },
            RawCartLine {
                id: Some(LineId::new("l1")),
                product: None,
                quantity: Some(1),
            },
        ];
        assert_eq!(CartSnapshot::from_raw(raw).lines().len(), 1);
    }

    #[test]
    fn test_negative_values_are_clamped() {
        let line = CartLine::from_raw(RawCartLine {
            id: Some(LineId::new("l1")),
            product: Some(RawProduct {
                id: Some(ProductId::new("p1")),
                price: Some(Decimal::from(-5)),
                stock: Some(-2),
                ..RawProduct::default()
            }),
            quantity: Some(-1),
        })
        .unwrap();

        assert_eq!(line.quantity, 0);
        assert_eq!(line.stock_limit, Some(0));
        assert!(line.unit_price.is_none());
        assert!(!line.is_valid());
    }

    #[test]
    fn test_unknown_stock_is_never_at_limit() {
        let mut line = CartLine::from_raw(RawCartLine {
            id: Some(LineId::new("l1")),
            product: None,
            quantity: Some(99),
        })
        .unwrap();
        assert!(!line.at_stock_limit());

        line.stock_limit = Some(99);
        assert!(line.at_stock_limit());
    }

    #[test]
    fn test_empty_means_no_valid_lines() {
        let snapshot = CartSnapshot::from_raw(vec![RawCartLine {
            id: Some(LineId::new("l1")),
            product: None,
            quantity: Some(2),
        }]);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.item_count(), 0);
    }

    #[test]
    fn test_item_count_saturates() {
        let line = |id: &str| RawCartLine {
            id: Some(LineId::new(id)),
            product: Some(RawProduct {
                id: Some(ProductId::new("p1")),
                price: Some(Decimal::ONE),
                ..RawProduct::default()
            }),
            quantity: Some(i64::MAX),
        };
        let snapshot = CartSnapshot::from_raw(vec![line("l1"), line("l2")]);
        assert_eq!(snapshot.valid_lines().count(), 2);
        assert_eq!(snapshot.item_count(), u32::MAX);
    }
}
