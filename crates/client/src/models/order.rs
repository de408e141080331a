//! Order types. Read-only to the engine.

use cartwheel_core::{Money, OrderId, OrderStatus, PaymentStatus, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::CartLine;

/// Backend response to `create-order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    /// Backend order ID.
    #[serde(alias = "_id")]
    pub order_id: OrderId,
    /// Human-facing order number.
    pub order_number: String,
    /// Initial status.
    #[serde(default)]
    pub status: OrderStatus,
}

/// One purchased item, as shown on the order summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl OrderItem {
    /// Convert a valid cart line. `None` for invalid lines.
    #[must_use]
    pub fn from_line(line: &CartLine) -> Option<Self> {
        if !line.is_valid() {
            return None;
        }
        Some(Self {
            product_id: line.product_id.clone()?,
            name: line.name.clone().unwrap_or_default(),
            unit_price: line.unit_price?,
            quantity: line.quantity,
        })
    }
}

/// What the success surface shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub order_number: String,
    pub total: Money,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
}
