//! Session-related types.
//!
//! Types stored in the session for identity state. Credential checks are
//! the hosted platform's job; the session only remembers who it vouched for.

use serde::{Deserialize, Serialize};

use velours_core::UserId;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Platform-issued user id.
    pub id: UserId,
}

/// Session keys for identity data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the anonymous cart scope id.
    pub const CART_SCOPE: &str = "cart_scope";
}
