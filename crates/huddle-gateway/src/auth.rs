//! Handshake authentication
//!
//! Credentials are read from the upgrade request, never in-band. The
//! `Authorization: Bearer` header wins over a `token` query parameter.

use axum::http::{header, HeaderMap};
use huddle_core::{Result, UserId};
use huddle_store::{Credentials, SessionValidator};
use serde::Deserialize;
use tracing::warn;

/// `?token=...` on the upgrade URL, for clients that cannot set headers.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub fn extract_credentials(headers: &HeaderMap, query: &TokenQuery) -> Credentials {
    Credentials {
        token: bearer_token(headers).or_else(|| query.token.clone().filter(|t| !t.is_empty())),
    }
}

/// Resolve the identity for an upgrade request.
pub async fn authenticate(
    validator: &dyn SessionValidator,
    headers: &HeaderMap,
    query: &TokenQuery,
) -> Result<UserId> {
    let credentials = extract_credentials(headers, query);
    validator.validate(&credentials).await.map_err(|e| {
        warn!("Handshake rejected: {}", e);
        e
    })
}
