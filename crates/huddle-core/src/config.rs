//! Gateway configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HuddleConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub presence: PresenceConfig,
    pub style: StyleConfig,
    pub generation: GenerationConfig,
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: BindMode,
}

/// Bind mode for the gateway
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    Loopback,
    #[default]
    Lan,
}

impl BindMode {
    pub fn to_addr(&self) -> &str {
        match self {
            BindMode::Loopback => "127.0.0.1",
            BindMode::Lan => "0.0.0.0",
        }
    }
}

/// How session tokens presented on the handshake are validated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Token → user id table from `auth.sessions`.
    #[default]
    Static,
    /// Ask the external session service at `auth.validate_url`.
    Http,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// Endpoint of the session validation service. Only used in http mode.
    pub validate_url: Option<String>,
    /// Bearer token required on `POST /groups/{groupId}/events`. Unset
    /// leaves the endpoint open to anything that can reach the port.
    pub service_token: Option<String>,
    /// Session token → user id. Only used in static mode.
    pub sessions: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Lifetime of a presence entry. Entries left behind by a crashed
    /// process expire after this long.
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// New messages required before a user model is recomputed.
    pub user_interval: u64,
    /// New messages required before a group model is recomputed.
    pub group_interval: u64,
    /// Messages a user needs before the companion agent answers in their style.
    pub user_minimum: u64,
    /// Messages a group needs before the collective agent answers.
    pub group_minimum: u64,
    pub max_phrases: usize,
    pub max_symbols: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub api_url: Option<String>,
    /// Sent when the subject has too few messages.
    pub not_enough_data_text: String,
    /// Sent when a subject has data but no rendered style prompt.
    pub no_model_text: String,
    /// Sent when the provider fails.
    pub apology_text: String,
}

/// Users and groups loaded into the in-memory store at startup. Ignored
/// when an external store owns membership.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub users: Vec<String>,
    /// Group id → member user ids.
    pub groups: HashMap<String, Vec<String>>,
}

// ============================================================
// Defaults
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 18790,
            bind: BindMode::default(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
        }
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            user_interval: 10,
            group_interval: 20,
            user_minimum: 10,
            group_minimum: 20,
            max_phrases: 15,
            max_symbols: 20,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "claude-haiku-4-5-20251001".to_string(),
            max_tokens: 1024,
            temperature: Some(0.8),
            api_url: None,
            not_enough_data_text: "I'm still learning how you talk. Keep chatting and I'll be ready to answer soon!".to_string(),
            no_model_text: "I haven't finished studying the conversation yet. Try again in a moment.".to_string(),
            apology_text: "Sorry, I couldn't come up with a reply right now.".to_string(),
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl HuddleConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} — using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} — using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Apply `HUDDLE_*` and provider environment overrides.
    pub fn apply_env(&mut self) {
        if let Some(port) = std::env::var("HUDDLE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.server.port = port;
        }
        if let Ok(model) = std::env::var("HUDDLE_MODEL") {
            self.generation.model = model;
        }
        if let Ok(url) = std::env::var("ANTHROPIC_API_URL") {
            self.generation.api_url = Some(url);
        }
        if let Ok(url) = std::env::var("HUDDLE_SESSION_URL") {
            self.auth.mode = AuthMode::Http;
            self.auth.validate_url = Some(url);
        }
        if let Ok(token) = std::env::var("HUDDLE_SERVICE_TOKEN") {
            self.auth.service_token = Some(token);
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.style.user_interval == 0 || self.style.group_interval == 0 {
            return Err(crate::Error::Config(
                "style intervals must be at least 1".into(),
            ));
        }
        if self.auth.mode == AuthMode::Http && self.auth.validate_url.is_none() {
            return Err(crate::Error::Config(
                "auth.mode = \"http\" requires auth.validate_url".into(),
            ));
        }
        if self.presence.ttl_secs == 0 {
            return Err(crate::Error::Config("presence.ttl_secs must be positive".into()));
        }
        Ok(())
    }
}
