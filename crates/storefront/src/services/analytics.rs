//! Conversion tracking for the advertising pixel.
//!
//! Events are fire-and-forget: cart and checkout operations never await
//! them, and every failure is swallowed after a debug log. When the pixel
//! is not configured the tracker is a no-op.

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;

use crate::config::AnalyticsConfig;

/// Conversions API version.
const API_VERSION: &str = "v21.0";

/// Conversions API base URL.
const BASE_URL: &str = "https://graph.facebook.com";

/// Fire-and-forget client for conversion events.
#[derive(Clone, Default)]
pub struct ConversionTracker {
    inner: Option<Arc<TrackerInner>>,
}

struct TrackerInner {
    client: reqwest::Client,
    endpoint: String,
    access_token: SecretString,
}

/// One event in the Conversions API shape.
#[derive(Debug, Serialize)]
struct Event {
    event_name: &'static str,
    event_time: i64,
    action_source: &'static str,
    custom_data: CustomData,
}

#[derive(Debug, Serialize)]
struct CustomData {
    /// Monetary value as a decimal string.
    value: String,
    currency: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    content_ids: Vec<String>,
    num_items: u32,
}

#[derive(Debug, Serialize)]
struct EventBatch {
    data: Vec<Event>,
}

impl ConversionTracker {
    /// Build a tracker from configuration.
    ///
    /// Returns a disabled tracker unless both the pixel id and the access
    /// token are present.
    #[must_use]
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        let (Some(pixel_id), Some(access_token)) =
            (&config.meta_pixel_id, &config.meta_access_token)
        else {
            return Self::disabled();
        };

        Self {
            inner: Some(Arc::new(TrackerInner {
                client: reqwest::Client::new(),
                endpoint: format!("{BASE_URL}/{API_VERSION}/{pixel_id}/events"),
                access_token: access_token.clone(),
            })),
        }
    }

    /// A tracker that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Report an add-to-cart conversion.
    pub fn add_to_cart(&self, value: Decimal, currency: &str, content_id: &str, quantity: u32) {
        self.send(Event {
            event_name: "AddToCart",
            event_time: chrono::Utc::now().timestamp(),
            action_source: "website",
            custom_data: CustomData {
                value: value.to_string(),
                currency: currency.to_owned(),
                content_ids: vec![content_id.to_owned()],
                num_items: quantity,
            },
        });
    }

    /// Report a product view.
    pub fn view_content(&self, value: Decimal, currency: &str, content_id: &str) {
        self.send(Event {
            event_name: "ViewContent",
            event_time: chrono::Utc::now().timestamp(),
            action_source: "website",
            custom_data: CustomData {
                value: value.to_string(),
                currency: currency.to_owned(),
                content_ids: vec![content_id.to_owned()],
                num_items: 1,
            },
        });
    }

    /// Report a checkout start over the whole cart.
    pub fn initiate_checkout(&self, value: Decimal, currency: &str, num_items: u32) {
        self.send(Event {
            event_name: "InitiateCheckout",
            event_time: chrono::Utc::now().timestamp(),
            action_source: "website",
            custom_data: CustomData {
                value: value.to_string(),
                currency: currency.to_owned(),
                content_ids: Vec::new(),
                num_items,
            },
        });
    }

    /// Report a completed purchase.
    pub fn purchase(&self, value: Decimal, currency: &str, num_items: u32) {
        self.send(Event {
            event_name: "Purchase",
            event_time: chrono::Utc::now().timestamp(),
            action_source: "website",
            custom_data: CustomData {
                value: value.to_string(),
                currency: currency.to_owned(),
                content_ids: Vec::new(),
                num_items,
            },
        });
    }

    /// Post one event in the background. Never blocks, never fails the caller.
    fn send(&self, event: Event) {
        let Some(inner) = self.inner.clone() else {
            return;
        };

        tokio::spawn(async move {
            let result = inner
                .client
                .post(&inner.endpoint)
                .query(&[("access_token", inner.access_token.expose_secret())])
                .json(&EventBatch { data: vec![event] })
                .send()
                .await;

            match result {
                Ok(response) if !response.status().is_success() => {
                    tracing::debug!(status = %response.status(), "conversion event rejected");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "conversion event failed");
                }
            }
        });
    }
}

impl std::fmt::Debug for ConversionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionTracker")
            .field("enabled", &self.inner.is_some())
            .finish()
    }
}
