//! Session validation contract

use huddle_core::{Error, Result, UserId};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

/// Credentials presented on the connection handshake.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: Option<String>,
}

impl Credentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }
}

/// Turns an externally issued session token into an identity.
#[async_trait::async_trait]
pub trait SessionValidator: Send + Sync {
    async fn validate(&self, credentials: &Credentials) -> Result<UserId>;
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Fixed token table, configured under `[auth.sessions]`.
#[derive(Clone, Debug, Default)]
pub struct StaticSessions {
    tokens: Vec<(String, UserId)>,
}

impl StaticSessions {
    pub fn new(table: &HashMap<String, String>) -> Self {
        Self {
            tokens: table
                .iter()
                .map(|(token, user)| (token.clone(), UserId::new(user.clone())))
                .collect(),
        }
    }

    pub fn with(mut self, token: impl Into<String>, user: impl Into<UserId>) -> Self {
        self.tokens.push((token.into(), user.into()));
        self
    }
}

#[async_trait::async_trait]
impl SessionValidator for StaticSessions {
    async fn validate(&self, credentials: &Credentials) -> Result<UserId> {
        let provided = credentials
            .token
            .as_deref()
            .ok_or_else(|| Error::auth_failed("token required"))?;
        // Compare against every entry so timing does not reveal the position.
        let mut found = None;
        for (token, user) in &self.tokens {
            if constant_time_eq(token.as_bytes(), provided.as_bytes()) {
                found = Some(user.clone());
            }
        }
        found.ok_or_else(|| Error::auth_failed("invalid token"))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResponse {
    user_id: String,
}

/// Asks the external session service: `GET {url}` with the token as a
/// bearer credential, expecting `{"userId": "..."}` on success.
pub struct HttpSessionValidator {
    client: Client,
    url: String,
}

impl HttpSessionValidator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl SessionValidator for HttpSessionValidator {
    async fn validate(&self, credentials: &Credentials) -> Result<UserId> {
        let token = credentials
            .token
            .as_deref()
            .ok_or_else(|| Error::auth_failed("token required"))?;

        let response = self
            .client
            .get(&self.url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                warn!("Session service unreachable: {}", e);
                Error::auth_failed("session service unavailable")
            })?;

        match response.status() {
            StatusCode::OK => {
                let body: ValidateResponse = response
                    .json()
                    .await
                    .map_err(|e| Error::auth_failed(format!("bad session response: {}", e)))?;
                if body.user_id.is_empty() {
                    return Err(Error::auth_failed("empty identity"));
                }
                Ok(UserId::new(body.user_id))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Err(Error::auth_failed("invalid token"))
            }
            status => {
                warn!("Session service returned {}", status);
                Err(Error::auth_failed(format!("session service error {}", status)))
            }
        }
    }
}
