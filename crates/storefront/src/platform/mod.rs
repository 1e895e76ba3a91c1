//! Hosted data-platform clients.
//!
//! The storefront keeps no relational storage of its own: authenticated
//! carts live in a hosted table reached over its REST API. This module
//! defines the port the cart engine consumes ([`ServerCartStore`]) and the
//! production client for it ([`PlatformCartStore`]). An in-memory backend
//! ([`memory::MemoryCartStore`]) exists for tests and local development.

mod cart_store;
pub mod memory;

pub use cart_store::PlatformCartStore;

use async_trait::async_trait;
use thiserror::Error;

use velours_core::{CartLineItem, LineItemId, NewLineItem, UserId};

/// Errors that can occur when talking to the hosted data platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// HTTP request failed (includes timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a response body.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Row not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// The server cart table, scoped per authenticated user id.
///
/// Consumed, not implemented, by the cart engine: rows carry the line-item
/// fields plus a foreign key to the user, and the store assigns ids on
/// insert.
#[async_trait]
pub trait ServerCartStore: Send + Sync {
    /// List all line items for a user, in insertion order.
    async fn list(&self, user_id: &UserId) -> Result<Vec<CartLineItem>, PlatformError>;

    /// Insert one line item; the returned item carries the assigned id.
    async fn insert(
        &self,
        user_id: &UserId,
        item: NewLineItem,
    ) -> Result<CartLineItem, PlatformError>;

    /// Set the quantity of one row by id.
    async fn update_quantity(
        &self,
        item_id: &LineItemId,
        quantity: u32,
    ) -> Result<(), PlatformError>;

    /// Delete one row by id.
    async fn delete(&self, item_id: &LineItemId) -> Result<(), PlatformError>;
}
