//! Velours Core - Shared types library.
//!
//! This crate provides common types used across all Velours components:
//! - `storefront` - Public-facing e-commerce site
//! - `integration-tests` - Cross-crate test harness
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, cart line items, and the cart identity key

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
