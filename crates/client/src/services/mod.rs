//! Engine services.
//!
//! # Services
//!
//! - `session` - Session State Manager: credential, user, cross-tab changes
//! - `cart` - Cart Synchronization Engine: mutations and re-fetches
//! - `pricing` - Pricing & Discount Calculator (pure)
//! - `coupons` - Coupon lookup with a short-lived cache
//! - `checkout` - Checkout State Machine

pub mod cart;
pub mod checkout;
pub mod coupons;
pub mod pricing;
pub mod session;

pub use cart::{CartEngine, CartState};
pub use checkout::CheckoutFlow;
pub use coupons::CouponBook;
pub use pricing::PricingResult;
pub use session::SessionManager;
