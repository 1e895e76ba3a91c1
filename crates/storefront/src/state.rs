//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use url::Url;

use crate::cart::{CartCache, CartController, GuestCartStore};
use crate::config::StorefrontConfig;
use crate::platform::ServerCartStore;
use crate::services::{CheckoutClient, CheckoutError, ConversionTracker};

/// How long an idle scope keeps its live controller. The guest store and
/// the hosted table are the durable copies; eviction only drops the
/// in-memory cache, which is rebuilt on the next fetch.
const CONTROLLER_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Error creating application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid base_url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("checkout client error: {0}")]
    Checkout(#[from] CheckoutError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the hosted-service clients and the per-scope
/// cart controllers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    server_store: Arc<dyn ServerCartStore>,
    checkout: CheckoutClient,
    tracker: ConversionTracker,
    /// One live cart engine per session scope, evicted when idle.
    controllers: Cache<String, Arc<CartController>>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `server_store` - Cart backend (the hosted platform in production)
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or a service client
    /// fails to build.
    pub fn new(
        config: StorefrontConfig,
        server_store: Arc<dyn ServerCartStore>,
    ) -> Result<Self, StateError> {
        let base_url = Url::parse(&config.base_url)?;
        let checkout = CheckoutClient::new(&config.checkout, &base_url)?;
        let tracker = ConversionTracker::from_config(&config.analytics);

        let controllers = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(CONTROLLER_IDLE_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                server_store,
                checkout,
                tracker,
                controllers,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the checkout client.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutClient {
        &self.inner.checkout
    }

    /// Get a reference to the conversion tracker.
    #[must_use]
    pub fn tracker(&self) -> &ConversionTracker {
        &self.inner.tracker
    }

    /// The live cart controller for a session scope, created on first use.
    pub async fn controller(&self, scope: &str) -> Arc<CartController> {
        let inner = &self.inner;
        inner
            .controllers
            .get_with(scope.to_owned(), async {
                Arc::new(CartController::new(
                    Arc::new(CartCache::new()),
                    GuestCartStore::open(&inner.config.data_dir, scope),
                    Arc::clone(&inner.server_store),
                    inner.tracker.clone(),
                ))
            })
            .await
    }
}
