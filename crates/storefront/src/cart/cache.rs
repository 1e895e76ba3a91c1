//! Shared cart cache with change notification.
//!
//! One `CartCache` instance exists per client scope and is handed by `Arc`
//! to everything that displays the cart, so all views re-render from the
//! same snapshot without re-fetching. Listeners are notified only when the
//! derived item count changes from its previously-notified value; a write
//! that round-trips without changing quantity totals stays silent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use velours_core::CartLineItem;

/// Handle returned by [`CartCache::subscribe`], used to unsubscribe.
pub type ListenerId = u64;

type Listener = Box<dyn Fn(&CartSnapshot) + Send + Sync>;

/// A consistent view of the cart at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CartSnapshot {
    /// Current line items, in cart order.
    pub items: Vec<CartLineItem>,
    /// Sum of quantities over `items`. Derived, never independently set.
    pub count: u32,
}

#[derive(Default)]
struct CacheState {
    items: Vec<CartLineItem>,
    count: u32,
    /// Count value the listeners last saw. `None` until the first update.
    notified_count: Option<u32>,
}

/// The single source of truth for "what the UI currently shows as the cart".
#[derive(Default)]
pub struct CartCache {
    state: Mutex<CacheState>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

/// Poison-tolerant lock: the cache holds no invariants that a panicked
/// writer could break mid-update (items and count are written together).
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CartCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list and recompute the derived count.
    ///
    /// Listeners run after the state lock is released, so a listener reading
    /// the cache sees the state it was notified about. Listeners must not
    /// subscribe or unsubscribe from inside the callback.
    pub fn update(&self, items: Vec<CartLineItem>) {
        let notify = {
            let mut state = lock(&self.state);
            state.count = items.iter().map(|item| item.quantity).sum();
            state.items = items;

            if state.notified_count == Some(state.count) {
                None
            } else {
                state.notified_count = Some(state.count);
                Some(CartSnapshot {
                    items: state.items.clone(),
                    count: state.count,
                })
            }
        };

        if let Some(snapshot) = notify {
            for (_, listener) in lock(&self.listeners).iter() {
                listener(&snapshot);
            }
        }
    }

    /// Current items and count as one consistent view.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        let state = lock(&self.state);
        CartSnapshot {
            items: state.items.clone(),
            count: state.count,
        }
    }

    /// Current line items.
    #[must_use]
    pub fn items(&self) -> Vec<CartLineItem> {
        lock(&self.state).items.clone()
    }

    /// Derived total quantity.
    #[must_use]
    pub fn count(&self) -> u32 {
        lock(&self.state).count
    }

    /// Register for change notification. Each view subscribes exactly once
    /// and unsubscribes with the returned id when it goes away.
    pub fn subscribe(&self, listener: impl Fn(&CartSnapshot) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, Box::new(listener)));
        id
    }

    /// Remove a previously registered listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        lock(&self.listeners).retain(|(listener_id, _)| *listener_id != id);
    }
}

impl std::fmt::Debug for CartCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("CartCache")
            .field("items", &state.items.len())
            .field("count", &state.count)
            .finish_non_exhaustive()
    }
}
