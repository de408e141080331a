//! Checkout form data sent with an order.

use serde::{Deserialize, Serialize};

/// Contact details of the buyer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

impl PersonalInfo {
    /// "First Last", trimmed.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// Postal address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub country: String,
}

/// How the buyer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card captured through the payment gateway.
    #[default]
    Card,
    /// Paid on delivery.
    CashOnDelivery,
    /// Paid by bank transfer after the order is placed.
    BankTransfer,
}

impl PaymentMethod {
    /// Whether the gateway captures this payment.
    #[must_use]
    pub const fn is_card_based(self) -> bool {
        matches!(self, Self::Card)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_wire_names() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::CashOnDelivery).unwrap(),
            "\"cash_on_delivery\""
        );
        assert!(PaymentMethod::Card.is_card_based());
        assert!(!PaymentMethod::BankTransfer.is_card_based());
    }

    #[test]
    fn test_full_name_trims() {
        let info = PersonalInfo {
            first_name: " Ann ".to_string(),
            last_name: String::new(),
            ..PersonalInfo::default()
        };
        assert_eq!(info.full_name(), "Ann");
    }

    #[test]
    fn test_address_omits_empty_country() {
        let address = Address {
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip: "62701".to_string(),
            country: String::new(),
        };
        let json = serde_json::to_value(&address).unwrap();
        assert!(json.get("country").is_none());
        assert_eq!(json["street"], "1 Main St");
    }
}
