//! Monetary amounts using decimal arithmetic.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A monetary amount with its currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: CurrencyCode,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub const fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// Amount in the currency's minor unit (cents for USD, yen for JPY),
    /// rounded half away from zero.
    ///
    /// Returns `None` if the amount does not fit in an `i64`.
    #[must_use]
    pub fn minor_units(&self) -> Option<i64> {
        let scale = Decimal::from(10_i64.pow(self.currency.minor_digits()));
        (self.amount * scale)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .try_into()
            .ok()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.currency.minor_digits();
        let rounded = self
            .amount
            .round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero);
        write!(
            f,
            "{}{:.*}",
            self.currency.symbol(),
            digits as usize,
            rounded
        )
    }
}

/// ISO 4217 currency codes accepted by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    JPY,
}

impl CurrencyCode {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
            Self::JPY => "¥",
        }
    }

    /// Lowercase code as payment gateways expect it.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "usd",
            Self::EUR => "eur",
            Self::GBP => "gbp",
            Self::CAD => "cad",
            Self::JPY => "jpy",
        }
    }

    /// Number of digits in the minor unit.
    #[must_use]
    pub const fn minor_digits(self) -> u32 {
        match self {
            Self::JPY => 0,
            _ => 2,
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::USD),
            "eur" => Ok(Self::EUR),
            "gbp" => Ok(Self::GBP),
            "cad" => Ok(Self::CAD),
            "jpy" => Ok(Self::JPY),
            _ => Err(format!("unsupported currency: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_rounds_to_minor_digits() {
        let usd = Money::new(Decimal::new(129_605, 1), CurrencyCode::USD);
        assert_eq!(usd.to_string(), "$12960.50");

        let jpy = Money::new(Decimal::from(6900), CurrencyCode::JPY);
        assert_eq!(jpy.to_string(), "¥6900");
    }

    #[test]
    fn test_minor_units() {
        let usd = Money::new(Decimal::new(1999, 2), CurrencyCode::USD);
        assert_eq!(usd.minor_units(), Some(1999));

        let jpy = Money::new(Decimal::from(12_960), CurrencyCode::JPY);
        assert_eq!(jpy.minor_units(), Some(12_960));
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!("USD".parse::<CurrencyCode>().unwrap(), CurrencyCode::USD);
        assert_eq!("jpy".parse::<CurrencyCode>().unwrap(), CurrencyCode::JPY);
        assert!("doubloons".parse::<CurrencyCode>().is_err());
    }
}
