//! Cart line items and the identity key used for merging.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::id::LineItemId;

/// Fallback image shown when a line item has no image of its own.
pub const DEFAULT_ITEM_IMAGE: &str = "/images/product-placeholder.jpg";

/// A single line item in a cart.
///
/// Guest-scoped items carry a client-generated UUID id; server-scoped items
/// carry whatever id the hosted table assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    /// Unique within a cart.
    pub id: LineItemId,
    /// Display name of the product.
    pub product_name: String,
    /// Display variant (e.g., color or scent); part of the identity key.
    pub variant: String,
    /// Always >= 1; an update to 0 is a removal, not a zero-quantity line.
    pub quantity: u32,
    /// Decimal string in the item's own currency, not normalized at this layer.
    pub unit_price: String,
    /// ISO-like currency code; part of the identity key.
    pub currency: String,
    /// Display image, if any.
    pub image_url: Option<String>,
}

impl CartLineItem {
    /// The identity key deciding whether two additions merge into one entry.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey {
            product_name: self.product_name.clone(),
            variant: self.variant.clone(),
            currency: self.currency.clone(),
        }
    }

    /// Image URL for display, falling back to the placeholder.
    #[must_use]
    pub fn image_url_or_default(&self) -> &str {
        self.image_url.as_deref().unwrap_or(DEFAULT_ITEM_IMAGE)
    }

    /// Price of the full line (`unit_price` x `quantity`).
    ///
    /// Returns `None` if the stored price string does not parse as a decimal.
    #[must_use]
    pub fn line_value(&self) -> Option<Decimal> {
        let unit: Decimal = self.unit_price.parse().ok()?;
        Some(unit * Decimal::from(self.quantity))
    }
}

/// A line item that has not been assigned an id yet (input to add/insert).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub product_name: String,
    pub variant: String,
    pub quantity: u32,
    pub unit_price: String,
    pub currency: String,
    pub image_url: Option<String>,
}

impl NewLineItem {
    /// The identity key deciding whether this addition merges with an
    /// existing entry.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey {
            product_name: self.product_name.clone(),
            variant: self.variant.clone(),
            currency: self.currency.clone(),
        }
    }

    /// Composite content identifier reported to conversion tracking.
    #[must_use]
    pub fn content_id(&self) -> String {
        format!("{} ({})", self.product_name, self.variant)
    }

    /// Monetary value of this addition (`unit_price` x `quantity`).
    ///
    /// Returns `None` if the price string does not parse as a decimal.
    #[must_use]
    pub fn line_value(&self) -> Option<Decimal> {
        let unit: Decimal = self.unit_price.parse().ok()?;
        Some(unit * Decimal::from(self.quantity))
    }

    /// Attach an id, producing a full line item.
    #[must_use]
    pub fn into_item(self, id: LineItemId) -> CartLineItem {
        CartLineItem {
            id,
            product_name: self.product_name,
            variant: self.variant,
            quantity: self.quantity,
            unit_price: self.unit_price,
            currency: self.currency,
            image_url: self.image_url,
        }
    }
}

impl From<CartLineItem> for NewLineItem {
    /// Drop the id, e.g. when re-inserting a guest line into the server
    /// cart and letting the store assign a fresh one.
    fn from(item: CartLineItem) -> Self {
        Self {
            product_name: item.product_name,
            variant: item.variant,
            quantity: item.quantity,
            unit_price: item.unit_price,
            currency: item.currency,
            image_url: item.image_url,
        }
    }
}

/// The (`product_name`, `variant`, `currency`) tuple as a value type.
///
/// Structural equality on the three fields. Two line items with equal keys
/// are the same cart entry and their quantities are summed rather than
/// duplicated, both on guest-cart insertion and on guest-to-server migration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub product_name: String,
    pub variant: String,
    pub currency: String,
}
