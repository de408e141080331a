//! Cartwheel storefront client engine.
//!
//! Keeps an authentication session, a server-owned cart and a multi-step
//! checkout consistent with a remote storefront backend. Views are out of
//! scope: they read state through the handles exposed here and subscribe to
//! the [`events::EventBus`].
//!
//! Entry point is [`Storefront`], which wires the session manager, cart
//! engine, coupon lookup and checkout flow to a backend, a payment gateway,
//! a navigator and a key-value store.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod navigation;
pub mod payment;
pub mod services;
pub mod state;
pub mod storage;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{ClientError, Result};
pub use state::{EventLoopHandle, Storefront};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
