//! The cart engine.
//!
//! A cart belongs to exactly one scope at a time: an anonymous session
//! (persisted by [`guest::GuestCartStore`]) or an authenticated user
//! (persisted by the hosted platform). [`cache::CartCache`] mirrors
//! whichever cart is active for every view of it, and
//! [`controller::CartController`] owns the routing between the two stores,
//! the optimistic-update discipline, and the one-time guest-to-server
//! migration at login.

pub mod cache;
pub mod controller;
pub mod guest;

pub use cache::{CartCache, CartSnapshot, ListenerId};
pub use controller::{CartController, Identity};
pub use guest::GuestCartStore;

use thiserror::Error;

use crate::platform::PlatformError;

/// Errors surfaced by cart operations.
///
/// Guest-store failures never appear here: local persistence is best
/// effort by design. Everything below comes from the hosted platform.
#[derive(Debug, Error)]
pub enum CartError {
    /// A server cart write or read failed; any optimistic mutation has
    /// been rolled back.
    #[error("cart backend error: {0}")]
    Backend(#[from] PlatformError),

    /// Some guest items could not be migrated at login. Migrated items
    /// stay migrated; there is no compensating rollback.
    #[error("migrated {migrated} of {total} guest cart items")]
    PartialMigration { migrated: usize, total: usize },
}
