//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//!
//! # Cart
//! GET  /cart                   - Current cart (items, subtotal, count)
//! POST /cart/add               - Add item (merges by identity key)
//! POST /cart/update            - Update quantity (<= 0 removes)
//! POST /cart/remove            - Remove item
//! GET  /cart/count             - Cart count badge
//!
//! # Checkout
//! GET  /checkout               - Redirect to the hosted checkout session
//!
//! # Identity glue (verification is the hosted platform's job)
//! POST /auth/login             - Record platform-authenticated user
//! POST /auth/logout            - Drop authenticated identity
//! ```

pub mod auth;
pub mod cart;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/count", get(cart::count))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Cart routes
        .nest("/cart", cart_routes())
        // Checkout redirect
        .route("/checkout", get(cart::checkout))
        // Identity glue
        .nest("/auth", auth_routes())
}
