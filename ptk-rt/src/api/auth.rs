//! Request authentication
//!
//! Tokens are accepted from an `Authorization: Bearer` header or, for browser
//! WebSocket clients that cannot set headers, a `?token=` query parameter.

use axum::http::{header, HeaderMap};
use ptk_common::model::Identity;
use serde::Deserialize;
use tracing::warn;

use super::ApiError;
use crate::AppState;

/// `?token=` query parameter
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Pick the connection token, preferring the query parameter
pub fn extract_token(headers: &HeaderMap, query: &TokenQuery) -> Option<String> {
    if let Some(token) = query.token.as_deref().filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Verify the request's token and return its identity
pub async fn authenticate_request(
    state: &AppState,
    headers: &HeaderMap,
    query: &TokenQuery,
) -> Result<Identity, ApiError> {
    let token = extract_token(headers, query)
        .ok_or_else(|| ApiError::Unauthorized("Missing token".to_string()))?;

    state.authenticator.authenticate(&token).await.map_err(|e| {
        warn!("Authentication failed: {}", e);
        ApiError::Unauthorized("Invalid token".to_string())
    })
}

/// As [`authenticate_request`], additionally requiring the coach role
pub async fn require_coach(
    state: &AppState,
    headers: &HeaderMap,
    query: &TokenQuery,
) -> Result<Identity, ApiError> {
    let identity = authenticate_request(state, headers, query).await?;
    if !identity.is_coach() {
        return Err(ApiError::Forbidden("Coach role required".to_string()));
    }
    Ok(identity)
}
