//! Error types for Huddle

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication failed: {reason}")]
    AuthenticationFailure { reason: String },

    #[error("not authorized: {0}")]
    AuthorizationFailure(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("delivery failed to {user}: {reason}")]
    DeliveryFailure { user: String, reason: String },

    #[error("generation failed: {0}")]
    GenerationFailure(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn auth_failed(reason: impl Into<String>) -> Self {
        Self::AuthenticationFailure {
            reason: reason.into(),
        }
    }

    pub fn delivery(user: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::DeliveryFailure {
            user: user.to_string(),
            reason: reason.into(),
        }
    }

    pub fn persistence(message: impl std::fmt::Display) -> Self {
        Self::Persistence(message.to_string())
    }

    /// Message shown to the client in a scoped `*:error` event.
    ///
    /// Internal failures are not echoed verbatim.
    pub fn client_message(&self) -> String {
        match self {
            Self::AuthorizationFailure(_) | Self::NotFound(_) | Self::InvalidMessage(_) => {
                self.to_string()
            }
            Self::Persistence(_) => "failed to save message".to_string(),
            Self::GenerationFailure(_) => "generation failed".to_string(),
            _ => "internal error".to_string(),
        }
    }
}
