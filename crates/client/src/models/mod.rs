//! Domain models for the client engine.
//!
//! Wire shapes from the backend are normalized here, once, into types with
//! explicit optional fields so views never default nullable values
//! themselves.

pub mod cart;
pub mod checkout;
pub mod coupon;
pub mod order;
pub mod session;

pub use cart::{CartLine, CartSnapshot, RawCartLine, RawProduct};
pub use checkout::{Address, PaymentMethod, PersonalInfo};
pub use coupon::{Coupon, CouponKind, normalize_code};
pub use order::{OrderItem, OrderSummary, PlacedOrder};
pub use session::{Session, SessionStatus, SessionTicket};
