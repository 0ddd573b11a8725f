//! Checkout session creation and the payment webhook

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::accounts::User;
use crate::api::auth::CurrentUser;
use crate::api::state::AppState;
use crate::error::{PrepError, Result};
use crate::payments::SIGNATURE_HEADER;

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub success: bool,
    pub checkout_url: String,
    pub session_id: String,
}

/// Create a provider checkout session for `user` and return where to send them
pub async fn start_checkout(state: &AppState, user: &User) -> Result<CheckoutResponse> {
    let session = state
        .payments
        .create_checkout_session(user, &state.config.server.public_url)
        .await?;

    let checkout_url = session
        .url
        .ok_or_else(|| PrepError::Payment("Checkout session has no URL".to_string()))?;

    Ok(CheckoutResponse {
        success: true,
        checkout_url,
        session_id: session.id,
    })
}

/// POST /api/create-checkout-session
pub async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<CheckoutResponse>> {
    Ok(Json(start_checkout(&state, &user).await?))
}

/// POST /webhook
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let event = state.webhooks.parse_event(&body, signature)?;
    let outcome = state.webhooks.handle(&event).await?;
    info!(event = %event.kind, "Webhook processed: {:?}", outcome);

    Ok(Json(json!({ "received": true })))
}
