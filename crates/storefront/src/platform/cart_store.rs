//! REST client for the hosted cart table.
//!
//! The platform exposes tables over a PostgREST-style API: filters are
//! query parameters (`user_id=eq.<id>`), inserts return the created row
//! when asked to via the `Prefer` header.

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use velours_core::{CartLineItem, LineItemId, NewLineItem, UserId};

use super::{PlatformError, ServerCartStore};
use crate::config::PlatformConfig;

/// Table holding authenticated cart rows.
const CART_TABLE: &str = "cart_items";

/// HTTP client for the hosted platform's cart table.
#[derive(Debug, Clone)]
pub struct PlatformCartStore {
    client: reqwest::Client,
    table_url: String,
}

/// Row shape returned by the platform.
#[derive(Debug, Deserialize)]
struct CartRow {
    id: String,
    product_name: String,
    variant: String,
    quantity: u32,
    unit_price: String,
    currency: String,
    image_url: Option<String>,
}

impl From<CartRow> for CartLineItem {
    fn from(row: CartRow) -> Self {
        Self {
            id: LineItemId::new(row.id),
            product_name: row.product_name,
            variant: row.variant,
            quantity: row.quantity,
            unit_price: row.unit_price,
            currency: row.currency,
            image_url: row.image_url,
        }
    }
}

/// Insert body: the line-item fields plus the owning user id.
#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    user_id: &'a str,
    product_name: &'a str,
    variant: &'a str,
    quantity: u32,
    unit_price: &'a str,
    currency: &'a str,
    image_url: Option<&'a str>,
}

impl PlatformCartStore {
    /// Create a new platform cart client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let mut headers = HeaderMap::new();

        let key = config.service_key.expose_secret();
        headers.insert(
            "apikey",
            HeaderValue::from_str(key)
                .map_err(|e| PlatformError::Parse(format!("invalid service key format: {e}")))?,
        );
        let bearer = format!("Bearer {key}");
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&bearer)
                .map_err(|e| PlatformError::Parse(format!("invalid service key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            table_url: format!("{}/rest/v1/{CART_TABLE}", config.url.trim_end_matches('/')),
        })
    }

    /// Convert a non-success response into `PlatformError::Api`.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(PlatformError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait::async_trait]
impl ServerCartStore for PlatformCartStore {
    async fn list(&self, user_id: &UserId) -> Result<Vec<CartLineItem>, PlatformError> {
        let user_filter = format!("eq.{user_id}");
        let response = self
            .client
            .get(&self.table_url)
            .query(&[
                ("select", "*"),
                ("user_id", user_filter.as_str()),
                ("order", "created_at.asc"),
            ])
            .send()
            .await?;

        let rows: Vec<CartRow> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::Parse(e.to_string()))?;

        Ok(rows.into_iter().map(CartLineItem::from).collect())
    }

    async fn insert(
        &self,
        user_id: &UserId,
        item: NewLineItem,
    ) -> Result<CartLineItem, PlatformError> {
        let body = InsertRow {
            user_id: user_id.as_str(),
            product_name: &item.product_name,
            variant: &item.variant,
            quantity: item.quantity,
            unit_price: &item.unit_price,
            currency: &item.currency,
            image_url: item.image_url.as_deref(),
        };

        let response = self
            .client
            .post(&self.table_url)
            // Ask for the created row back so we learn the assigned id
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;

        let rows: Vec<CartRow> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::Parse(e.to_string()))?;

        rows.into_iter()
            .next()
            .map(CartLineItem::from)
            .ok_or_else(|| PlatformError::Parse("insert returned no row".to_owned()))
    }

    async fn update_quantity(
        &self,
        item_id: &LineItemId,
        quantity: u32,
    ) -> Result<(), PlatformError> {
        let id_filter = format!("eq.{item_id}");
        let response = self
            .client
            .patch(&self.table_url)
            .query(&[("id", id_filter.as_str())])
            .json(&serde_json::json!({ "quantity": quantity }))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, item_id: &LineItemId) -> Result<(), PlatformError> {
        let id_filter = format!("eq.{item_id}");
        let response = self
            .client
            .delete(&self.table_url)
            .query(&[("id", id_filter.as_str())])
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
