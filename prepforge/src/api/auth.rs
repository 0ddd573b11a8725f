//! Session authentication for pages and API routes

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, header::HeaderMap, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::accounts::User;
use crate::api::state::AppState;
use crate::error::{PrepError, Result};
use crate::security::RateLimit;

/// Signed-in user, inserted into request extensions by the session middlewares
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// 302 redirect
pub fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
        "Redirecting...",
    )
        .into_response()
}

/// Resolve the session cookie to a stored user
pub async fn session_user(state: &AppState, headers: &HeaderMap) -> Result<Option<User>> {
    let Some(claims) = state.sessions.claims_from_headers(headers) else {
        return Ok(None);
    };
    let Some(user_id) = claims.user_id() else {
        warn!("Session token with malformed subject: {}", claims.sub);
        return Ok(None);
    };

    let user = state.users.find_by_id(user_id).await?;
    if user.is_none() {
        debug!(user_id, "Session refers to a deleted user");
    }
    Ok(user)
}

/// API routes: 401 JSON without a valid session, 429 when the user floods the API
pub async fn require_api_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let user = match session_user(&state, req.headers()).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return PrepError::Unauthorized("Authentication required".to_string()).into_response()
        }
        Err(e) => return e.into_response(),
    };

    if !state
        .rate_limiter
        .check_user_limit(user.id, RateLimit::ApiRequestsPerUser)
        .await
    {
        return PrepError::TooManyRequests(RateLimit::ApiRequestsPerUser.description().to_string())
            .into_response();
    }

    req.extensions_mut().insert(CurrentUser(user));
    next.run(req).await
}

/// HTML pages: redirect to the signin form without a valid session
pub async fn require_page_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    match session_user(&state, req.headers()).await {
        Ok(Some(user)) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Ok(None) => found("/signin"),
        Err(e) => e.into_response(),
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = PrepError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| PrepError::Unauthorized("Not authenticated".to_string()))
    }
}
