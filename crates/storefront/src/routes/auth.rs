//! Identity glue routes.
//!
//! Authentication itself is the hosted platform's job. These handlers only
//! record which user the platform vouched for and drive the cart engine's
//! identity state machine - the login transition is what triggers the
//! one-time guest-cart migration.

use axum::{Json, extract::State};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use velours_core::UserId;

use crate::error::{AppError, Result};
use crate::models::{CurrentUser, session_keys};
use crate::routes::cart::{CartView, engine};
use crate::state::AppState;

/// Login request data: the platform-issued user id.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
}

/// Record a platform-authenticated user in the session.
///
/// Observing the new identity migrates the guest cart into the user's
/// server cart (exactly once per transition) and re-hydrates the cache.
/// The response is the merged cart.
#[instrument(skip(state, session, request))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<Json<CartView>> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user_id is required".into()));
    }

    let user = CurrentUser {
        id: UserId::new(request.user_id),
    };
    session
        .insert(session_keys::CURRENT_USER, &user)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;

    let (controller, _) = engine(&state, &session).await?;
    Ok(Json(CartView::from(&controller.cache().snapshot())))
}

/// Drop the authenticated identity from the session.
///
/// The server cart is abandoned, not cleared; the next observation reads
/// the (empty) guest cart fresh.
#[instrument(skip(state, session))]
pub async fn logout(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;

    let (controller, _) = engine(&state, &session).await?;
    Ok(Json(CartView::from(&controller.cache().snapshot())))
}
