//! Step-scoped form validation.
//!
//! Validation is local. It never reaches the network and never blocks
//! reading; it only blocks moving forward.

use std::fmt;

use cartwheel_core::Email;

use crate::models::{Address, PersonalInfo};

use super::draft::CheckoutForm;

/// One invalid field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Form field name, e.g. `shipping.zip`.
    pub field: &'static str,
    /// Message to show next to the field.
    pub message: String,
}

/// All invalid fields of one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Errors for a single field.
    #[must_use]
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    /// Record an invalid field.
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Message for `field`, if it is invalid.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", error.message)?;
        }
        Ok(())
    }
}

fn require(errors: &mut ValidationErrors, field: &'static str, value: &str, label: &str) {
    if value.trim().is_empty() {
        errors.push(field, format!("{label} is required"));
    }
}

/// Personal info step: names, a valid email and a phone number.
///
/// # Errors
///
/// Returns every invalid field.
pub fn validate_personal_info(info: &PersonalInfo) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    require(&mut errors, "first_name", &info.first_name, "First name");
    require(&mut errors, "last_name", &info.last_name, "Last name");
    if let Err(e) = Email::parse(&info.email) {
        errors.push("email", e.to_string());
    }
    require(&mut errors, "phone", &info.phone, "Phone");
    errors.into_result()
}

/// Field names reported for one address block.
struct AddressFields {
    street: &'static str,
    city: &'static str,
    state: &'static str,
    zip: &'static str,
}

const SHIPPING: AddressFields = AddressFields {
    street: "shipping.street",
    city: "shipping.city",
    state: "shipping.state",
    zip: "shipping.zip",
};

const BILLING: AddressFields = AddressFields {
    street: "billing.street",
    city: "billing.city",
    state: "billing.state",
    zip: "billing.zip",
};

fn validate_address(errors: &mut ValidationErrors, fields: &AddressFields, address: &Address) {
    require(errors, fields.street, &address.street, "Street");
    require(errors, fields.city, &address.city, "City");
    require(errors, fields.state, &address.state, "State");
    require(errors, fields.zip, &address.zip, "ZIP code");
}

/// Shipping step: the shipping address, and the billing address when it
/// differs.
///
/// # Errors
///
/// Returns every invalid field.
pub fn validate_addresses(form: &CheckoutForm) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    validate_address(&mut errors, &SHIPPING, &form.shipping_address);
    if !form.billing_same_as_shipping {
        validate_address(&mut errors, &BILLING, &form.billing_address);
    }
    errors.into_result()
}

/// Payment step. Only card payments have required fields.
///
/// # Errors
///
/// Returns every invalid field.
pub fn validate_payment(form: &CheckoutForm) -> Result<(), ValidationErrors> {
    if !form.payment_method.is_card_based() {
        return Ok(());
    }

    let mut errors = ValidationErrors::default();
    let card = &form.card;

    let digits = card.number_digits();
    if digits.len() != 16 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        errors.push("card.number", "Card number must be 16 digits");
    }
    if !is_valid_expiry(&card.expiry) {
        errors.push("card.expiry", "Expiry must be MM/YY");
    }
    let cvv = card.cvv();
    if !(3..=4).contains(&cvv.len()) || !cvv.bytes().all(|b| b.is_ascii_digit()) {
        errors.push("card.cvv", "CVV must be 3 or 4 digits");
    }
    require(&mut errors, "card.holder_name", &card.holder_name, "Cardholder name");

    errors.into_result()
}

/// `MM/YY` with a month between 01 and 12.
fn is_valid_expiry(expiry: &str) -> bool {
    let Some((month, year)) = expiry.split_once('/') else {
        return false;
    };
    let two_digits = |s: &str| s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit());
    two_digits(month)
        && two_digits(year)
        && month.parse::<u8>().is_ok_and(|m| (1..=12).contains(&m))
}
