//! Cart route handlers.
//!
//! Thin JSON glue over the cart engine. The session carries the anonymous
//! cart scope and the authenticated user id; every handler resolves the
//! scope's live controller and lets it route between the guest store and
//! the hosted table.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use velours_core::{LineItemId, NewLineItem};

use crate::cart::{CartController, CartSnapshot, Identity};
use crate::error::{AppError, Result};
use crate::models::{CurrentUser, session_keys};
use crate::state::AppState;

/// Cart item display data.
#[derive(Debug, Clone, Serialize)]
pub struct CartItemView {
    pub id: String,
    pub product_name: String,
    pub variant: String,
    pub quantity: u32,
    pub unit_price: String,
    pub line_price: String,
    pub currency: String,
    pub image_url: String,
}

/// Cart display data.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: String,
    pub currency: String,
    pub item_count: u32,
}

/// Cart count badge data.
#[derive(Debug, Clone, Serialize)]
pub struct CartCountView {
    pub count: u32,
}

// =============================================================================
// Type Conversions
// =============================================================================

impl From<&CartSnapshot> for CartView {
    fn from(snapshot: &CartSnapshot) -> Self {
        let currency = snapshot
            .items
            .first()
            .map_or_else(|| "USD".to_owned(), |item| item.currency.clone());

        let subtotal: rust_decimal::Decimal = snapshot
            .items
            .iter()
            .filter_map(velours_core::CartLineItem::line_value)
            .sum();

        Self {
            items: snapshot.items.iter().map(CartItemView::from).collect(),
            subtotal: subtotal.to_string(),
            currency,
            item_count: snapshot.count,
        }
    }
}

impl From<&velours_core::CartLineItem> for CartItemView {
    fn from(item: &velours_core::CartLineItem) -> Self {
        Self {
            id: item.id.to_string(),
            product_name: item.product_name.clone(),
            variant: item.variant.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price.clone(),
            line_price: item
                .line_value()
                .map_or_else(|| item.unit_price.clone(), |value| value.to_string()),
            currency: item.currency.clone(),
            image_url: item.image_url_or_default().to_owned(),
        }
    }
}

// =============================================================================
// Session Helpers
// =============================================================================

/// Get the session's anonymous cart scope, creating one on first use.
async fn cart_scope(session: &Session) -> Result<String> {
    if let Ok(Some(scope)) = session.get::<String>(session_keys::CART_SCOPE).await {
        return Ok(scope);
    }
    let scope = uuid::Uuid::new_v4().to_string();
    session
        .insert(session_keys::CART_SCOPE, &scope)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    Ok(scope)
}

/// The identity the session currently vouches for.
async fn current_identity(session: &Session) -> Identity {
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
        .map_or(Identity::Guest, |user| Identity::User(user.id))
}

/// Resolve the session's live cart engine, hydrated for its identity.
pub(super) async fn engine(
    state: &AppState,
    session: &Session,
) -> Result<(Arc<CartController>, Identity)> {
    let scope = cart_scope(session).await?;
    let controller = state.controller(&scope).await;
    let identity = current_identity(session).await;
    controller.observe_identity(&identity).await?;
    Ok((controller, identity))
}

// =============================================================================
// Request Types
// =============================================================================

/// Add to cart request data.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_name: String,
    pub variant: String,
    pub quantity: Option<u32>,
    pub unit_price: String,
    pub currency: String,
    pub image_url: Option<String>,
}

/// Update cart request data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub item_id: String,
    pub quantity: i64,
}

/// Remove from cart request data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub item_id: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the current cart.
#[instrument(skip(state, session))]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    match engine(&state, &session).await {
        Ok((controller, _)) => Ok(Json(CartView::from(&controller.cache().snapshot()))),
        Err(e) => {
            // An unreachable backend should not blank the page; serve
            // whatever the scope's cache last held.
            tracing::warn!(error = %e, "serving cart from cache after fetch failure");
            let scope = cart_scope(&session).await?;
            let controller = state.controller(&scope).await;
            Ok(Json(CartView::from(&controller.cache().snapshot())))
        }
    }
}

/// Add an item to the cart.
///
/// Merges with an existing line sharing the item's identity key; the
/// response reflects the optimistic cart state.
#[instrument(skip(state, session, request), fields(product = %request.product_name))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<AddToCartRequest>,
) -> Result<Json<CartView>> {
    let quantity = request.quantity.unwrap_or(1);
    if quantity == 0 {
        return Err(AppError::BadRequest("quantity must be at least 1".into()));
    }
    if request.product_name.trim().is_empty() {
        return Err(AppError::BadRequest("product_name is required".into()));
    }

    let item = NewLineItem {
        product_name: request.product_name,
        variant: request.variant,
        quantity,
        unit_price: request.unit_price,
        currency: request.currency,
        image_url: request.image_url,
    };

    let (controller, identity) = engine(&state, &session).await?;
    controller.add_to_cart(item, &identity).await?;
    Ok(Json(CartView::from(&controller.cache().snapshot())))
}

/// Update a cart line's quantity. Zero or below removes the line.
#[instrument(skip(state, session, request))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<UpdateCartRequest>,
) -> Result<Json<CartView>> {
    let (controller, identity) = engine(&state, &session).await?;
    let item_id = LineItemId::new(request.item_id);
    controller
        .update_quantity(&item_id, request.quantity, &identity)
        .await?;
    Ok(Json(CartView::from(&controller.cache().snapshot())))
}

/// Remove an item from the cart.
#[instrument(skip(state, session, request))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<RemoveFromCartRequest>,
) -> Result<Json<CartView>> {
    let (controller, identity) = engine(&state, &session).await?;
    let item_id = LineItemId::new(request.item_id);
    controller.remove_from_cart(&item_id, &identity).await?;
    Ok(Json(CartView::from(&controller.cache().snapshot())))
}

/// Get the cart count badge.
#[instrument(skip(state, session))]
pub async fn count(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<CartCountView>> {
    let (controller, _) = engine(&state, &session).await?;
    Ok(Json(CartCountView {
        count: controller.cache().count(),
    }))
}

/// Hand the cart off to the hosted payments provider.
///
/// Works for guests too; emits an `InitiateCheckout` conversion event and
/// redirects to the hosted session URL. Clearing the server cart after a
/// successful payment is the provider webhook's job.
#[instrument(skip(state, session))]
pub async fn checkout(State(state): State<AppState>, session: Session) -> Result<Response> {
    let (controller, _) = engine(&state, &session).await?;
    let snapshot = controller.cache().snapshot();

    let currency = snapshot
        .items
        .first()
        .map_or_else(|| "USD".to_owned(), |item| item.currency.clone());
    let total: rust_decimal::Decimal = snapshot
        .items
        .iter()
        .filter_map(velours_core::CartLineItem::line_value)
        .sum();
    state
        .tracker()
        .initiate_checkout(total, &currency, snapshot.count);

    let checkout_session = state
        .checkout()
        .create_session(&snapshot.items, &currency)
        .await?;

    Ok(Redirect::to(&checkout_session.url).into_response())
}
