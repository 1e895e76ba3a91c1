//! Shared harness for Velours integration tests.
//!
//! Builds the storefront router in-process against the in-memory cart
//! backend, so the suite runs without hosted-platform credentials. The
//! router is assembled the same way the binary assembles it.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::StatusCode, routing::get};
use secrecy::SecretString;

use velours_storefront::config::{
    AnalyticsConfig, CheckoutConfig, PlatformConfig, StorefrontConfig,
};
use velours_storefront::platform::memory::MemoryCartStore;
use velours_storefront::state::AppState;
use velours_storefront::{middleware, routes};

/// A storefront configuration pointing at nothing real.
///
/// The platform client is replaced by the in-memory store, and checkout
/// tests stop before any request leaves the process.
#[must_use]
pub fn test_config(data_dir: &Path) -> StorefrontConfig {
    StorefrontConfig {
        host: "127.0.0.1".parse().expect("valid host"),
        port: 0,
        base_url: "http://storefront.test".to_owned(),
        data_dir: data_dir.to_path_buf(),
        platform: PlatformConfig {
            url: "http://platform.test".to_owned(),
            service_key: SecretString::from("kJ83hNv2qLpX5wRz9tBd"),
            request_timeout: Duration::from_secs(1),
        },
        checkout: CheckoutConfig {
            api_url: "http://payments.test".to_owned(),
            secret_key: SecretString::from("mQ61fWc8rYtK3xSv7uHe"),
            request_timeout: Duration::from_secs(1),
        },
        analytics: AnalyticsConfig::default(),
        sentry_dsn: None,
    }
}

/// Build the full storefront router over the in-memory cart backend.
///
/// # Panics
///
/// Panics if application state fails to build (test configuration is
/// static, so this only happens on a programming error).
#[must_use]
pub fn test_app(data_dir: &Path) -> Router {
    let config = test_config(data_dir);
    let state = AppState::new(config.clone(), Arc::new(MemoryCartStore::new()))
        .expect("failed to build test state");
    let session_layer = middleware::create_session_layer(&config);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::routes())
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(session_layer)
        .with_state(state)
}
