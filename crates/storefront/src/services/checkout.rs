//! Hosted checkout session client.
//!
//! Checkout is a handoff: we send the current line items to the payments
//! provider and redirect the visitor to the hosted page it returns. Guest
//! checkout is supported - the request carries no user identity. Clearing
//! the server cart after payment is the provider webhook's job, not ours.

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use velours_core::CartLineItem;

use crate::config::CheckoutConfig;

/// Errors that can occur when creating a checkout session.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a response body.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A session cannot be created for an empty cart.
    #[error("Cart is empty")]
    EmptyCart,
}

/// A created hosted checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Provider-assigned session id.
    pub id: String,
    /// Hosted payment page to redirect the visitor to.
    pub url: String,
}

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    currency: &'a str,
    success_url: String,
    cancel_url: String,
    line_items: Vec<LinePayload<'a>>,
}

#[derive(Debug, Serialize)]
struct LinePayload<'a> {
    name: &'a str,
    variant: &'a str,
    quantity: u32,
    unit_price: &'a str,
}

/// Client for the hosted payments provider's checkout-session endpoint.
#[derive(Debug, Clone)]
pub struct CheckoutClient {
    client: reqwest::Client,
    sessions_url: String,
    success_url: String,
    cancel_url: String,
}

impl CheckoutClient {
    /// Create a new checkout client.
    ///
    /// Return URLs are derived from the storefront's public base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret key is malformed or the HTTP client
    /// fails to build.
    pub fn new(config: &CheckoutConfig, base_url: &Url) -> Result<Self, CheckoutError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", config.secret_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&bearer)
                .map_err(|e| CheckoutError::Parse(format!("invalid secret key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        let join = |path: &str| {
            base_url
                .join(path)
                .map(String::from)
                .map_err(|e| CheckoutError::Parse(format!("invalid base URL: {e}")))
        };

        Ok(Self {
            client,
            sessions_url: format!("{}/v1/checkout/sessions", config.api_url.trim_end_matches('/')),
            success_url: join("/checkout/success")?,
            cancel_url: join("/cart")?,
        })
    }

    /// Request a hosted checkout session for the given line items.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` without calling the provider if
    /// `items` is empty, or an API/HTTP error from the provider.
    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn create_session(
        &self,
        items: &[CartLineItem],
        currency: &str,
    ) -> Result<CheckoutSession, CheckoutError> {
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let body = SessionRequest {
            currency,
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            line_items: items
                .iter()
                .map(|item| LinePayload {
                    name: &item.product_name,
                    variant: &item.variant,
                    quantity: item.quantity,
                    unit_price: &item.unit_price,
                })
                .collect(),
        };

        let response = self.client.post(&self.sessions_url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CheckoutError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| CheckoutError::Parse(e.to_string()))
    }
}
