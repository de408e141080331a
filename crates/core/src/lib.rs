//! Cartwheel Core - Shared types library.
//!
//! This crate provides common types used across all Cartwheel components:
//! - `client` - Session, cart, pricing and checkout engine
//! - `cli` - Terminal driver for the engine
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients,
//! no async runtime. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, emails, users,
//!   statuses and the bearer credential

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
