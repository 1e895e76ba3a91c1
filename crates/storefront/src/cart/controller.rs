//! Cart operations: guest/server routing, optimistic updates, migration.
//!
//! One controller exists per client scope. Every mutation updates the
//! shared [`CartCache`] before the backing write settles, so views reflect
//! the change immediately; the write's outcome then either confirms the
//! mutation (e.g. adopting the server-assigned id) or rolls it back to the
//! pre-mutation state. Guest-store writes are local and synchronous, so
//! the guest path needs no rollback at all.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::instrument;

use velours_core::{LineItemId, NewLineItem, UserId};

use super::cache::CartCache;
use super::guest::GuestCartStore;
use super::CartError;
use crate::platform::ServerCartStore;
use crate::services::ConversionTracker;

/// Which cart scope the client currently acts under.
///
/// A cart is never scoped to both at once: the guest-to-authenticated
/// transition is a one-time migration, not a merge of two coexisting carts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Guest,
    User(UserId),
}

/// What the controller is doing right now.
///
/// Advisory only: it does not serialize mutations against each other. The
/// fetch path checks it to skip a hydration that would clobber an in-flight
/// optimistic mutation with stale server data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Idle,
    Mutating,
    Fetching,
}

struct ControllerState {
    activity: Activity,
    /// Identity the cache was last hydrated for; repeat fetches for the
    /// same identity are no-ops.
    fetched: Option<Identity>,
    /// Last identity observed, for detecting login/logout transitions.
    observed: Option<Identity>,
}

/// Resets the activity flag when an operation completes or unwinds early.
struct ActivityGuard<'a> {
    state: &'a Mutex<ControllerState>,
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).activity = Activity::Idle;
    }
}

fn lock(state: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The cart operation surface for one client scope.
pub struct CartController {
    cache: Arc<CartCache>,
    guest: GuestCartStore,
    server: Arc<dyn ServerCartStore>,
    tracker: ConversionTracker,
    state: Mutex<ControllerState>,
}

impl CartController {
    #[must_use]
    pub fn new(
        cache: Arc<CartCache>,
        guest: GuestCartStore,
        server: Arc<dyn ServerCartStore>,
        tracker: ConversionTracker,
    ) -> Self {
        Self {
            cache,
            guest,
            server,
            tracker,
            state: Mutex::new(ControllerState {
                activity: Activity::Idle,
                fetched: None,
                observed: None,
            }),
        }
    }

    /// The cache this controller mutates; views subscribe here.
    #[must_use]
    pub fn cache(&self) -> &Arc<CartCache> {
        &self.cache
    }

    fn begin(&self, activity: Activity) -> ActivityGuard<'_> {
        lock(&self.state).activity = activity;
        ActivityGuard { state: &self.state }
    }

    /// Add an item to the active cart, merging with an existing entry that
    /// shares its identity key.
    ///
    /// The cache reflects the addition before the backing write settles.
    /// A conversion event is emitted on both paths, fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns an error if the server write fails; the optimistic mutation
    /// is rolled back first.
    #[instrument(skip(self, item), fields(product = %item.product_name))]
    pub async fn add_to_cart(
        &self,
        item: NewLineItem,
        identity: &Identity,
    ) -> Result<(), CartError> {
        self.tracker.add_to_cart(
            item.line_value().unwrap_or_default(),
            &item.currency,
            &item.content_id(),
            item.quantity,
        );

        match identity {
            Identity::Guest => {
                self.add_to_guest_cart(item);
                Ok(())
            }
            Identity::User(user_id) => self.add_to_server_cart(item, user_id).await,
        }
    }

    /// Guest path: read-merge-write against local storage, then publish.
    /// No await points, so no rollback is ever needed here.
    fn add_to_guest_cart(&self, item: NewLineItem) {
        let mut items = self.guest.load();
        if let Some(existing) = items.iter_mut().find(|i| i.key() == item.key()) {
            existing.quantity += item.quantity;
        } else {
            let id = self.guest.generate_id();
            items.push(item.into_item(id));
        }
        self.guest.save(&items);
        self.cache.update(items);
    }

    async fn add_to_server_cart(
        &self,
        item: NewLineItem,
        user_id: &UserId,
    ) -> Result<(), CartError> {
        let _guard = self.begin(Activity::Mutating);

        let snapshot = self.cache.items();
        let existing = snapshot
            .iter()
            .find(|i| i.key() == item.key())
            .map(|i| (i.id.clone(), i.quantity));

        if let Some((item_id, prior_quantity)) = existing {
            // Matched in the cache snapshot, not re-fetched: increment the
            // quantity optimistically and confirm with a background update.
            let new_quantity = prior_quantity + item.quantity;
            self.set_cached_quantity(&item_id, new_quantity);

            if let Err(e) = self.server.update_quantity(&item_id, new_quantity).await {
                tracing::error!(error = %e, "cart quantity update failed, rolling back");
                self.set_cached_quantity(&item_id, prior_quantity);
                return Err(e.into());
            }
            Ok(())
        } else {
            // New entry: show it under a temporary client id, then adopt
            // the server-assigned id once the insert lands.
            let temp_id = LineItemId::generate();
            let mut items = snapshot;
            items.push(item.clone().into_item(temp_id.clone()));
            self.cache.update(items);

            match self.server.insert(user_id, item).await {
                Ok(inserted) => {
                    let items = self
                        .cache
                        .items()
                        .into_iter()
                        .map(|i| if i.id == temp_id { inserted.clone() } else { i })
                        .collect();
                    self.cache.update(items);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(error = %e, "cart insert failed, rolling back");
                    let items = self
                        .cache
                        .items()
                        .into_iter()
                        .filter(|i| i.id != temp_id)
                        .collect();
                    self.cache.update(items);
                    Err(e.into())
                }
            }
        }
    }

    /// Remove an item from the active cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the server delete fails; the item is restored
    /// to its original position first.
    #[instrument(skip(self))]
    pub async fn remove_from_cart(
        &self,
        item_id: &LineItemId,
        identity: &Identity,
    ) -> Result<(), CartError> {
        match identity {
            Identity::Guest => {
                let items: Vec<_> = self
                    .guest
                    .load()
                    .into_iter()
                    .filter(|i| &i.id != item_id)
                    .collect();
                self.guest.save(&items);
                self.cache.update(items);
                Ok(())
            }
            Identity::User(_) => {
                let _guard = self.begin(Activity::Mutating);

                let snapshot = self.cache.items();
                let Some((index, removed)) = snapshot
                    .iter()
                    .enumerate()
                    .find(|(_, i)| &i.id == item_id)
                    .map(|(index, i)| (index, i.clone()))
                else {
                    return Ok(());
                };

                let items: Vec<_> = snapshot
                    .into_iter()
                    .filter(|i| &i.id != item_id)
                    .collect();
                self.cache.update(items);

                if let Err(e) = self.server.delete(item_id).await {
                    tracing::error!(error = %e, "cart delete failed, rolling back");
                    let mut items = self.cache.items();
                    items.insert(index.min(items.len()), removed);
                    self.cache.update(items);
                    return Err(e.into());
                }
                Ok(())
            }
        }
    }

    /// Set an item's quantity. A quantity of zero or less is a removal,
    /// never a zero-quantity line item.
    ///
    /// # Errors
    ///
    /// Returns an error if the server write fails; the prior quantity is
    /// restored first.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        item_id: &LineItemId,
        quantity: i64,
        identity: &Identity,
    ) -> Result<(), CartError> {
        if quantity <= 0 {
            return self.remove_from_cart(item_id, identity).await;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);

        match identity {
            Identity::Guest => {
                let items: Vec<_> = self
                    .guest
                    .load()
                    .into_iter()
                    .map(|mut i| {
                        if &i.id == item_id {
                            i.quantity = quantity;
                        }
                        i
                    })
                    .collect();
                self.guest.save(&items);
                self.cache.update(items);
                Ok(())
            }
            Identity::User(_) => {
                let _guard = self.begin(Activity::Mutating);

                let Some(prior_quantity) = self
                    .cache
                    .items()
                    .iter()
                    .find(|i| &i.id == item_id)
                    .map(|i| i.quantity)
                else {
                    return Ok(());
                };

                self.set_cached_quantity(item_id, quantity);

                if let Err(e) = self.server.update_quantity(item_id, quantity).await {
                    tracing::error!(error = %e, "cart quantity update failed, rolling back");
                    self.set_cached_quantity(item_id, prior_quantity);
                    return Err(e.into());
                }
                Ok(())
            }
        }
    }

    /// Hydrate the cache for an identity, at most once per identity.
    ///
    /// A repeat call for the already-hydrated identity reads nothing. A
    /// fetch is skipped entirely while a mutation is in flight, so stale
    /// server data can never overwrite an optimistic update.
    ///
    /// # Errors
    ///
    /// Returns an error if the server read fails; the identity stays
    /// unhydrated so the next call retries.
    #[instrument(skip(self))]
    pub async fn fetch_items(&self, identity: &Identity) -> Result<(), CartError> {
        {
            let mut state = lock(&self.state);
            if state.fetched.as_ref() == Some(identity) {
                return Ok(());
            }
            if state.activity == Activity::Mutating {
                tracing::debug!("fetch suppressed: mutation in flight");
                return Ok(());
            }
            state.activity = Activity::Fetching;
        }
        let _guard = ActivityGuard { state: &self.state };

        let items = match identity {
            Identity::Guest => self.guest.load(),
            Identity::User(user_id) => self.server.list(user_id).await?,
        };

        self.cache.update(items);
        lock(&self.state).fetched = Some(identity.clone());
        Ok(())
    }

    /// Move the guest cart into a user's server cart.
    ///
    /// No-op when the guest store is empty. Each guest line either merges
    /// into a server entry with the same identity key (quantities summed)
    /// or is inserted fresh, dropping its guest-generated id. The guest
    /// store is cleared once all items are processed and the authenticated
    /// cart is re-fetched into the cache.
    ///
    /// # Errors
    ///
    /// Returns `CartError::PartialMigration` when some items failed;
    /// already-migrated items are not reverted.
    #[instrument(skip(self))]
    pub async fn migrate_guest_cart(&self, user_id: &UserId) -> Result<(), CartError> {
        let guest_items = self.guest.load();
        if guest_items.is_empty() {
            return Ok(());
        }
        let total = guest_items.len();

        // Read the server cart once up front; merging is decided against
        // this snapshot, matching one-shot migration semantics.
        let server_items = self.server.list(user_id).await?;

        let mut migrated = 0_usize;
        for item in guest_items {
            let result = match server_items.iter().find(|s| s.key() == item.key()) {
                Some(existing) => {
                    self.server
                        .update_quantity(&existing.id, existing.quantity + item.quantity)
                        .await
                }
                None => self
                    .server
                    .insert(user_id, NewLineItem::from(item.clone()))
                    .await
                    .map(|_| ()),
            };

            match result {
                Ok(()) => migrated += 1,
                Err(e) => {
                    tracing::error!(
                        product = %item.product_name,
                        error = %e,
                        "failed to migrate guest cart item"
                    );
                }
            }
        }

        // The guest cart is consumed once processed; lines that failed are
        // accepted as lost rather than left in a half-migrated store.
        self.guest.clear();
        lock(&self.state).fetched = None;
        self.fetch_items(&Identity::User(user_id.clone())).await?;

        if migrated == total {
            Ok(())
        } else {
            Err(CartError::PartialMigration { migrated, total })
        }
    }

    /// Drive the identity state machine.
    ///
    /// The transition into an authenticated identity from a guest (or
    /// unobserved) state triggers exactly one migration followed by one
    /// fetch. Logout clears the remembered fetch identity so the guest
    /// cart is re-read. Switching users is a fresh login for the new user
    /// with no migration (the guest cart is already empty by then).
    ///
    /// # Errors
    ///
    /// Returns the migration error if one occurred, otherwise any fetch
    /// error.
    #[instrument(skip(self))]
    pub async fn observe_identity(&self, identity: &Identity) -> Result<(), CartError> {
        let migrate_for = {
            let mut state = lock(&self.state);
            let prior = state.observed.replace(identity.clone());
            if prior.as_ref() == Some(identity) {
                None
            } else {
                // Identity changed: whatever was hydrated belongs to the
                // old scope.
                state.fetched = None;
                match (prior, identity) {
                    (_, Identity::Guest) => None,
                    // User switch: a fresh login for the new user, never a
                    // second migration.
                    (Some(Identity::User(_)), Identity::User(_)) => None,
                    // No prior authenticated identity observed: migrate.
                    (Some(Identity::Guest) | None, Identity::User(user_id)) => {
                        Some(user_id.clone())
                    }
                }
            }
        };

        let migration = match migrate_for {
            Some(user_id) => self.migrate_guest_cart(&user_id).await,
            None => Ok(()),
        };

        let fetch = self.fetch_items(identity).await;
        migration.and(fetch)
    }

    /// Replace one cached item's quantity, leaving everything else as is.
    fn set_cached_quantity(&self, item_id: &LineItemId, quantity: u32) {
        let items: Vec<_> = self
            .cache
            .items()
            .into_iter()
            .map(|mut i| {
                if &i.id == item_id {
                    i.quantity = quantity;
                }
                i
            })
            .collect();
        self.cache.update(items);
    }
}

impl std::fmt::Debug for CartController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartController")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use velours_core::CartLineItem;

    use super::*;
    use crate::platform::PlatformError;

    /// In-memory store with call counters, failure injection, and an
    /// optional gate that holds quantity updates open mid-flight.
    #[derive(Default)]
    struct MockStore {
        rows: Mutex<Vec<(UserId, CartLineItem)>>,
        next_id: AtomicUsize,
        list_calls: AtomicUsize,
        insert_calls: AtomicUsize,
        update_calls: AtomicUsize,
        fail_insert: AtomicBool,
        fail_update: AtomicBool,
        fail_delete: AtomicBool,
        update_gate: Mutex<Option<Arc<Notify>>>,
    }

    impl MockStore {
        fn failure() -> PlatformError {
            PlatformError::Api {
                status: 503,
                message: "unavailable".to_owned(),
            }
        }

        fn seed(&self, user_id: &UserId, item: CartLineItem) {
            self.rows.lock().unwrap().push((user_id.clone(), item));
        }

        fn rows_for(&self, user_id: &UserId) -> Vec<CartLineItem> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .filter(|(owner, _)| owner == user_id)
                .map(|(_, item)| item.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl ServerCartStore for MockStore {
        async fn list(&self, user_id: &UserId) -> Result<Vec<CartLineItem>, PlatformError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.rows_for(user_id))
        }

        async fn insert(
            &self,
            user_id: &UserId,
            item: NewLineItem,
        ) -> Result<CartLineItem, PlatformError> {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(Self::failure());
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let item = item.into_item(LineItemId::new(format!("srv-{id}")));
            self.rows.lock().unwrap().push((user_id.clone(), item.clone()));
            Ok(item)
        }

        async fn update_quantity(
            &self,
            item_id: &LineItemId,
            quantity: u32,
        ) -> Result<(), PlatformError> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.update_gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if self.fail_update.load(Ordering::SeqCst) {
                return Err(Self::failure());
            }
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.iter_mut().find(|(_, item)| &item.id == item_id) {
                row.1.quantity = quantity;
            }
            Ok(())
        }

        async fn delete(&self, item_id: &LineItemId) -> Result<(), PlatformError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(Self::failure());
            }
            self.rows
                .lock()
                .unwrap()
                .retain(|(_, item)| &item.id != item_id);
            Ok(())
        }
    }

    fn new_item(name: &str, variant: &str, quantity: u32) -> NewLineItem {
        NewLineItem {
            product_name: name.to_owned(),
            variant: variant.to_owned(),
            quantity,
            unit_price: "32.00".to_owned(),
            currency: "USD".to_owned(),
            image_url: None,
        }
    }

    fn server_item(id: &str, name: &str, variant: &str, quantity: u32) -> CartLineItem {
        new_item(name, variant, quantity).into_item(LineItemId::new(id))
    }

    fn harness() -> (tempfile::TempDir, Arc<MockStore>, Arc<CartController>) {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockStore::default());
        let controller = Arc::new(CartController::new(
            Arc::new(CartCache::new()),
            GuestCartStore::open(dir.path(), "test-scope"),
            Arc::<MockStore>::clone(&mock) as Arc<dyn ServerCartStore>,
            ConversionTracker::disabled(),
        ));
        (dir, mock, controller)
    }

    fn user() -> UserId {
        UserId::new("user-1")
    }

    fn cache_quantities(controller: &CartController) -> Vec<(String, u32)> {
        controller
            .cache()
            .items()
            .into_iter()
            .map(|i| (i.product_name, i.quantity))
            .collect()
    }

    // ------------------------------------------------------------------
    // Guest path
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_guest_add_merges_by_identity_key() {
        let (_dir, _mock, controller) = harness();

        controller
            .add_to_cart(new_item("Rose Serum", "Vanilla", 1), &Identity::Guest)
            .await
            .unwrap();
        controller
            .add_to_cart(new_item("Rose Serum", "Vanilla", 2), &Identity::Guest)
            .await
            .unwrap();

        assert_eq!(
            cache_quantities(&controller),
            vec![("Rose Serum".to_owned(), 3)]
        );
        assert_eq!(controller.cache().count(), 3);
    }

    #[tokio::test]
    async fn test_guest_add_distinct_keys_appends() {
        let (_dir, _mock, controller) = harness();

        controller
            .add_to_cart(new_item("Rose Serum", "Vanilla", 1), &Identity::Guest)
            .await
            .unwrap();
        controller
            .add_to_cart(new_item("Rose Serum", "Amber", 1), &Identity::Guest)
            .await
            .unwrap();

        assert_eq!(controller.cache().items().len(), 2);
    }

    #[tokio::test]
    async fn test_guest_cart_persists_across_controllers() {
        let dir = tempfile::tempdir().unwrap();
        let scope = "returning-visitor";

        let first = CartController::new(
            Arc::new(CartCache::new()),
            GuestCartStore::open(dir.path(), scope),
            Arc::new(MockStore::default()),
            ConversionTracker::disabled(),
        );
        first
            .add_to_cart(new_item("Night Cream", "Plain", 2), &Identity::Guest)
            .await
            .unwrap();

        let second = CartController::new(
            Arc::new(CartCache::new()),
            GuestCartStore::open(dir.path(), scope),
            Arc::new(MockStore::default()),
            ConversionTracker::disabled(),
        );
        second.fetch_items(&Identity::Guest).await.unwrap();
        assert_eq!(second.cache().count(), 2);
    }

    #[tokio::test]
    async fn test_guest_update_quantity_and_floor() {
        let (_dir, _mock, controller) = harness();

        controller
            .add_to_cart(new_item("Rose Serum", "Vanilla", 1), &Identity::Guest)
            .await
            .unwrap();
        let id = controller.cache().items().first().unwrap().id.clone();

        controller
            .update_quantity(&id, 4, &Identity::Guest)
            .await
            .unwrap();
        assert_eq!(controller.cache().count(), 4);

        // Zero and below are removals, never zero-quantity lines.
        controller
            .update_quantity(&id, 0, &Identity::Guest)
            .await
            .unwrap();
        assert!(controller.cache().items().is_empty());
    }

    // ------------------------------------------------------------------
    // Authenticated path: optimistic updates and rollback
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_auth_add_adopts_server_assigned_id() {
        let (_dir, mock, controller) = harness();
        let identity = Identity::User(user());

        controller
            .add_to_cart(new_item("Rose Serum", "Vanilla", 2), &identity)
            .await
            .unwrap();

        let items = controller.cache().items();
        assert_eq!(items.len(), 1);
        assert_eq!(items.first().unwrap().id.as_str(), "srv-1");
        assert_eq!(mock.rows_for(&user()).len(), 1);
    }

    #[tokio::test]
    async fn test_auth_add_existing_key_sums_quantities_via_update() {
        let (_dir, mock, controller) = harness();
        let identity = Identity::User(user());
        mock.seed(&user(), server_item("srv-9", "Rose Serum", "Vanilla", 3));
        controller.fetch_items(&identity).await.unwrap();

        controller
            .add_to_cart(new_item("Rose Serum", "Vanilla", 2), &identity)
            .await
            .unwrap();

        assert_eq!(controller.cache().count(), 5);
        assert_eq!(mock.rows_for(&user()).first().unwrap().quantity, 5);
        assert_eq!(mock.insert_calls.load(Ordering::SeqCst), 0);
        assert_eq!(mock.update_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_add_insert_failure_removes_temporary_item() {
        let (_dir, mock, controller) = harness();
        let identity = Identity::User(user());
        mock.fail_insert.store(true, Ordering::SeqCst);

        let result = controller
            .add_to_cart(new_item("Rose Serum", "Vanilla", 1), &identity)
            .await;

        assert!(result.is_err());
        assert!(controller.cache().items().is_empty());
        assert_eq!(controller.cache().count(), 0);
    }

    #[tokio::test]
    async fn test_auth_add_increment_failure_rolls_back() {
        let (_dir, mock, controller) = harness();
        let identity = Identity::User(user());
        mock.seed(&user(), server_item("srv-9", "Rose Serum", "Vanilla", 3));
        controller.fetch_items(&identity).await.unwrap();
        mock.fail_update.store(true, Ordering::SeqCst);

        let result = controller
            .add_to_cart(new_item("Rose Serum", "Vanilla", 2), &identity)
            .await;

        assert!(result.is_err());
        // Symmetric with remove/update: the optimistic increment is undone.
        assert_eq!(controller.cache().count(), 3);
    }

    #[tokio::test]
    async fn test_remove_rolls_back_at_original_position_on_failure() {
        let (_dir, mock, controller) = harness();
        let identity = Identity::User(user());
        mock.seed(&user(), server_item("srv-1", "Rose Serum", "Vanilla", 1));
        mock.seed(&user(), server_item("srv-2", "Night Cream", "Plain", 1));
        mock.seed(&user(), server_item("srv-3", "Lip Tint", "Coral", 1));
        controller.fetch_items(&identity).await.unwrap();
        mock.fail_delete.store(true, Ordering::SeqCst);

        let result = controller
            .remove_from_cart(&LineItemId::new("srv-2"), &identity)
            .await;

        assert!(result.is_err());
        let names: Vec<_> = controller
            .cache()
            .items()
            .into_iter()
            .map(|i| i.product_name)
            .collect();
        assert_eq!(names, vec!["Rose Serum", "Night Cream", "Lip Tint"]);
    }

    #[tokio::test]
    async fn test_remove_succeeds_server_side() {
        let (_dir, mock, controller) = harness();
        let identity = Identity::User(user());
        mock.seed(&user(), server_item("srv-1", "Rose Serum", "Vanilla", 2));
        controller.fetch_items(&identity).await.unwrap();

        controller
            .remove_from_cart(&LineItemId::new("srv-1"), &identity)
            .await
            .unwrap();

        assert!(controller.cache().items().is_empty());
        assert!(mock.rows_for(&user()).is_empty());
    }

    #[tokio::test]
    async fn test_update_quantity_failure_restores_prior_value() {
        let (_dir, mock, controller) = harness();
        let identity = Identity::User(user());
        mock.seed(&user(), server_item("srv-1", "Rose Serum", "Vanilla", 2));
        controller.fetch_items(&identity).await.unwrap();
        mock.fail_update.store(true, Ordering::SeqCst);

        let result = controller
            .update_quantity(&LineItemId::new("srv-1"), 7, &identity)
            .await;

        assert!(result.is_err());
        assert_eq!(controller.cache().count(), 2);
    }

    #[tokio::test]
    async fn test_update_quantity_zero_is_removal_server_side() {
        let (_dir, mock, controller) = harness();
        let identity = Identity::User(user());
        mock.seed(&user(), server_item("srv-1", "Rose Serum", "Vanilla", 2));
        controller.fetch_items(&identity).await.unwrap();

        controller
            .update_quantity(&LineItemId::new("srv-1"), -3, &identity)
            .await
            .unwrap();

        assert!(controller.cache().items().is_empty());
        assert!(mock.rows_for(&user()).is_empty());
    }

    // ------------------------------------------------------------------
    // Fetch de-duplication and suppression
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_fetch_deduplicates_per_identity() {
        let (_dir, mock, controller) = harness();
        let identity = Identity::User(user());

        controller.fetch_items(&identity).await.unwrap();
        controller.fetch_items(&identity).await.unwrap();
        assert_eq!(mock.list_calls.load(Ordering::SeqCst), 1);

        // A different identity forces exactly one more read.
        controller.fetch_items(&Identity::Guest).await.unwrap();
        controller
            .fetch_items(&Identity::User(UserId::new("user-2")))
            .await
            .unwrap();
        assert_eq!(mock.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_suppressed_while_mutation_in_flight() {
        let (_dir, mock, controller) = harness();
        let identity = Identity::User(user());
        mock.seed(&user(), server_item("srv-1", "Rose Serum", "Vanilla", 1));
        controller.fetch_items(&identity).await.unwrap();
        assert_eq!(mock.list_calls.load(Ordering::SeqCst), 1);

        // Hold the server write open so the mutation stays in flight.
        let gate = Arc::new(Notify::new());
        *mock.update_gate.lock().unwrap() = Some(Arc::clone(&gate));

        let task = {
            let controller = Arc::clone(&controller);
            let identity = identity.clone();
            tokio::spawn(async move {
                controller
                    .update_quantity(&LineItemId::new("srv-1"), 5, &identity)
                    .await
            })
        };

        // Let the spawned mutation run up to its await point: the
        // optimistic value must already be visible.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(controller.cache().count(), 5);

        // A fetch for another identity would overwrite the optimistic
        // state with stale data; it must be skipped, not queued.
        controller.fetch_items(&Identity::Guest).await.unwrap();
        assert_eq!(mock.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.cache().count(), 5);

        gate.notify_one();
        task.await.unwrap().unwrap();
        assert_eq!(controller.cache().count(), 5);
    }

    // ------------------------------------------------------------------
    // Migration
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_migration_empty_guest_cart_is_noop() {
        let (_dir, mock, controller) = harness();

        controller.migrate_guest_cart(&user()).await.unwrap();

        assert_eq!(mock.list_calls.load(Ordering::SeqCst), 0);
        assert_eq!(mock.insert_calls.load(Ordering::SeqCst), 0);
        assert_eq!(mock.update_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_migration_merges_matching_keys() {
        let (_dir, mock, controller) = harness();
        mock.seed(&user(), server_item("srv-1", "Rose Serum", "Vanilla", 3));

        controller
            .add_to_cart(new_item("Rose Serum", "Vanilla", 2), &Identity::Guest)
            .await
            .unwrap();
        controller.migrate_guest_cart(&user()).await.unwrap();

        let rows = mock.rows_for(&user());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.first().unwrap().quantity, 5);

        // The guest store is consumed and the cache now mirrors the server.
        let guest = GuestCartStore::open(_dir.path(), "test-scope");
        assert!(guest.load().is_empty());
        assert_eq!(controller.cache().count(), 5);
    }

    #[tokio::test]
    async fn test_migration_partial_failure_keeps_migrated_items() {
        let (_dir, mock, controller) = harness();
        mock.seed(&user(), server_item("srv-1", "Rose Serum", "Vanilla", 1));

        controller
            .add_to_cart(new_item("Rose Serum", "Vanilla", 2), &Identity::Guest)
            .await
            .unwrap();
        controller
            .add_to_cart(new_item("Night Cream", "Plain", 1), &Identity::Guest)
            .await
            .unwrap();

        // Merges go through updates; fresh rows need inserts, which fail.
        mock.fail_insert.store(true, Ordering::SeqCst);
        let result = controller.migrate_guest_cart(&user()).await;

        match result {
            Err(CartError::PartialMigration { migrated, total }) => {
                assert_eq!((migrated, total), (1, 2));
            }
            other => panic!("expected partial migration, got {other:?}"),
        }

        // The merged line landed and stays; the guest store is consumed.
        assert_eq!(mock.rows_for(&user()).first().unwrap().quantity, 3);
        let guest = GuestCartStore::open(_dir.path(), "test-scope");
        assert!(guest.load().is_empty());
    }

    // ------------------------------------------------------------------
    // Identity state machine
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_migrates_exactly_once() {
        let (_dir, mock, controller) = harness();
        let identity = Identity::User(user());

        controller.observe_identity(&Identity::Guest).await.unwrap();
        controller
            .add_to_cart(new_item("Rose Serum", "Vanilla", 1), &Identity::Guest)
            .await
            .unwrap();

        controller.observe_identity(&identity).await.unwrap();
        assert_eq!(mock.insert_calls.load(Ordering::SeqCst), 1);
        let list_calls = mock.list_calls.load(Ordering::SeqCst);

        // Re-observing the same identity neither migrates nor re-fetches.
        controller.observe_identity(&identity).await.unwrap();
        assert_eq!(mock.insert_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mock.list_calls.load(Ordering::SeqCst), list_calls);
    }

    #[tokio::test]
    async fn test_logout_refetches_guest_and_abandons_server_cart() {
        let (_dir, mock, controller) = harness();
        let identity = Identity::User(user());
        mock.seed(&user(), server_item("srv-1", "Rose Serum", "Vanilla", 2));

        controller.observe_identity(&identity).await.unwrap();
        assert_eq!(controller.cache().count(), 2);

        controller.observe_identity(&Identity::Guest).await.unwrap();
        assert_eq!(controller.cache().count(), 0);

        // The server cart is abandoned, not cleared.
        assert_eq!(mock.rows_for(&user()).len(), 1);
    }

    #[tokio::test]
    async fn test_user_switch_does_not_migrate() {
        let (_dir, mock, controller) = harness();
        let user_b = UserId::new("user-2");
        mock.seed(&user_b, server_item("srv-7", "Lip Tint", "Coral", 1));

        controller
            .observe_identity(&Identity::User(user()))
            .await
            .unwrap();
        controller
            .observe_identity(&Identity::User(user_b.clone()))
            .await
            .unwrap();

        assert_eq!(mock.insert_calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.cache().count(), 1);
    }

    // ------------------------------------------------------------------
    // End-to-end properties
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_count_always_matches_sum_of_quantities() {
        let (_dir, mock, controller) = harness();
        let identity = Identity::User(user());
        mock.seed(&user(), server_item("srv-1", "Rose Serum", "Vanilla", 2));
        controller.fetch_items(&identity).await.unwrap();

        controller
            .add_to_cart(new_item("Night Cream", "Plain", 3), &identity)
            .await
            .unwrap();
        controller
            .update_quantity(&LineItemId::new("srv-1"), 1, &identity)
            .await
            .unwrap();

        let items = controller.cache().items();
        let sum: u32 = items.iter().map(|i| i.quantity).sum();
        assert_eq!(controller.cache().count(), sum);
        assert_eq!(sum, 4);
    }

    #[tokio::test]
    async fn test_guest_merge_then_login_scenario() {
        let (_dir, mock, controller) = harness();

        controller
            .add_to_cart(new_item("Rose Serum", "Vanilla", 1), &Identity::Guest)
            .await
            .unwrap();
        controller
            .add_to_cart(new_item("Rose Serum", "Vanilla", 2), &Identity::Guest)
            .await
            .unwrap();
        assert_eq!(
            cache_quantities(&controller),
            vec![("Rose Serum".to_owned(), 3)]
        );

        controller
            .observe_identity(&Identity::User(user()))
            .await
            .unwrap();

        let rows = mock.rows_for(&user());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.first().unwrap().quantity, 3);
        let guest = GuestCartStore::open(_dir.path(), "test-scope");
        assert!(guest.load().is_empty());
        assert_eq!(controller.cache().count(), 3);
    }
}
