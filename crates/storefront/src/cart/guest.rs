//! Durable persistence for guest (anonymous) carts.
//!
//! Each anonymous scope owns one JSON array of line items under the
//! guest-cart storage root. Reads never fail: an absent file or unparseable
//! content is treated as "no cart". Writes are best effort.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use velours_core::{CartLineItem, LineItemId};

/// Directory under the data dir holding one cart file per anonymous scope.
pub const GUEST_CART_DIR: &str = "guest-carts";

/// File-backed store for a single anonymous scope's cart.
///
/// The scope id (the anonymous session's storage key) names the file, so a
/// scope always finds its cart again under the same well-known location.
#[derive(Debug, Clone)]
pub struct GuestCartStore {
    path: PathBuf,
}

impl GuestCartStore {
    /// Open the store for one anonymous scope under `data_dir`.
    #[must_use]
    pub fn open(data_dir: &Path, scope: &str) -> Self {
        let path = data_dir.join(GUEST_CART_DIR).join(format!("{scope}.json"));
        Self { path }
    }

    /// Load the stored list.
    ///
    /// An absent file or content that fails to parse is "no cart" - the
    /// caller always gets a list, never an error.
    #[must_use]
    pub fn load(&self) -> Vec<CartLineItem> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read guest cart");
                return Vec::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "guest cart did not parse, treating as empty");
                Vec::new()
            }
        }
    }

    /// Persist the full list, replacing prior content.
    ///
    /// Best-effort: failures are logged, not surfaced.
    pub fn save(&self, items: &[CartLineItem]) {
        let result = self
            .path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| {
                let json = serde_json::to_vec(items)?;
                fs::write(&self.path, json)
            });

        if let Err(e) = result {
            tracing::error!(path = %self.path.display(), error = %e, "failed to persist guest cart");
        }
    }

    /// Remove the stored cart entirely (used after migration).
    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to clear guest cart");
            }
        }
    }

    /// Produce a fresh id for a new guest line item.
    #[must_use]
    pub fn generate_id(&self) -> LineItemId {
        LineItemId::generate()
    }
}
