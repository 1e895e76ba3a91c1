//! In-memory cart backend for tests and local development.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use velours_core::{CartLineItem, LineItemId, NewLineItem, UserId};

use super::{PlatformError, ServerCartStore};

/// A `ServerCartStore` backed by a `Vec` behind a mutex.
///
/// Assigns sequential `srv-N` ids on insert and preserves insertion order
/// per user, matching the hosted table's behavior closely enough for the
/// engine's tests and for running the storefront without credentials.
#[derive(Debug, Default)]
pub struct MemoryCartStore {
    rows: Mutex<Vec<(UserId, CartLineItem)>>,
    next_id: AtomicU64,
}

impl MemoryCartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one user's rows, for assertions.
    #[must_use]
    pub fn rows_for(&self, user_id: &UserId) -> Vec<CartLineItem> {
        self.rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, item)| item.clone())
            .collect()
    }
}

#[async_trait]
impl ServerCartStore for MemoryCartStore {
    async fn list(&self, user_id: &UserId) -> Result<Vec<CartLineItem>, PlatformError> {
        Ok(self.rows_for(user_id))
    }

    async fn insert(
        &self,
        user_id: &UserId,
        item: NewLineItem,
    ) -> Result<CartLineItem, PlatformError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let item = item.into_item(LineItemId::new(format!("srv-{id}")));
        self.rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((user_id.clone(), item.clone()));
        Ok(item)
    }

    async fn update_quantity(
        &self,
        item_id: &LineItemId,
        quantity: u32,
    ) -> Result<(), PlatformError> {
        let mut rows = self
            .rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let row = rows
            .iter_mut()
            .find(|(_, item)| &item.id == item_id)
            .ok_or_else(|| PlatformError::NotFound(item_id.to_string()))?;
        row.1.quantity = quantity;
        Ok(())
    }

    async fn delete(&self, item_id: &LineItemId) -> Result<(), PlatformError> {
        let mut rows = self
            .rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = rows.len();
        rows.retain(|(_, item)| &item.id != item_id);
        if rows.len() == before {
            return Err(PlatformError::NotFound(item_id.to_string()));
        }
        Ok(())
    }
}
