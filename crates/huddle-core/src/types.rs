//! Core types for Huddle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved user id the companion agent speaks as.
pub const COMPANION_AGENT_ID: &str = "companion";

/// Reserved user id the collective (group) agent speaks as.
pub const COLLECTIVE_AGENT_ID: &str = "collective";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Authenticated user identity.
    UserId
);

string_id!(
    /// Group identity.
    GroupId
);

impl UserId {
    pub fn companion() -> Self {
        Self::new(COMPANION_AGENT_ID)
    }

    pub fn collective() -> Self {
        Self::new(COLLECTIVE_AGENT_ID)
    }
}

/// Identifies one live connection. A new connection for the same user gets a
/// new id, which is what fences stale deregistrations.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a message is addressed.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Recipient {
    User(UserId),
    Group(GroupId),
}

/// A stored chat message. Immutable apart from the read flag, which only an
/// external collaborator sets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender_id: UserId,
    pub recipient: Recipient,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub generated: bool,
    #[serde(default)]
    pub read: bool,
}

impl ChatMessage {
    pub fn new(sender_id: UserId, recipient: Recipient, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id,
            recipient,
            content: content.into(),
            created_at: Utc::now(),
            generated: false,
            read: false,
        }
    }

    /// A message produced by one of the agents.
    pub fn generated(sender_id: UserId, recipient: Recipient, content: impl Into<String>) -> Self {
        Self {
            generated: true,
            ..Self::new(sender_id, recipient, content)
        }
    }
}

/// Whether a style model describes a user or a group.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    User,
    Group,
}

/// A user or group whose style is modelled.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Subject {
    User(UserId),
    Group(GroupId),
}

impl Subject {
    pub fn kind(&self) -> SubjectKind {
        match self {
            Subject::User(_) => SubjectKind::User,
            Subject::Group(_) => SubjectKind::Group,
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::User(id) => write!(f, "user:{}", id),
            Subject::Group(id) => write!(f, "group:{}", id),
        }
    }
}

/// Tone buckets used by the style heuristics.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Enthusiastic,
    Inquisitive,
    Positive,
    Negative,
    Casual,
    Formal,
}

impl Tone {
    pub const ALL: [Tone; 6] = [
        Tone::Enthusiastic,
        Tone::Inquisitive,
        Tone::Positive,
        Tone::Negative,
        Tone::Casual,
        Tone::Formal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Enthusiastic => "enthusiastic",
            Tone::Inquisitive => "inquisitive",
            Tone::Positive => "positive",
            Tone::Negative => "negative",
            Tone::Casual => "casual",
            Tone::Formal => "formal",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymbolCount {
    pub symbol: String,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToneShare {
    pub tone: Tone,
    pub percent: f64,
}

/// Features extracted from a subject's messages.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleFeatures {
    pub phrases: Vec<String>,
    pub symbols: Vec<SymbolCount>,
    pub average_length: f64,
    pub tone: Vec<ToneShare>,
}

impl StyleFeatures {
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty() && self.symbols.is_empty() && self.tone.is_empty()
    }
}

/// Per-subject style model. `rendered_prompt` is always derived from
/// `features` as of `last_computed_at`. After a reset, only messages created
/// at or after `reset_at` are learned from, and `observed_message_count`
/// counts only those.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleModel {
    pub subject: Subject,
    pub observed_message_count: u64,
    pub has_minimum_data: bool,
    pub features: StyleFeatures,
    pub rendered_prompt: String,
    pub last_computed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

impl StyleModel {
    pub fn empty(subject: Subject) -> Self {
        Self {
            subject,
            observed_message_count: 0,
            has_minimum_data: false,
            features: StyleFeatures::default(),
            rendered_prompt: String::new(),
            last_computed_at: None,
            reset_at: None,
        }
    }

    /// Empty model that forgets everything before `at`.
    pub fn reset(subject: Subject, at: DateTime<Utc>) -> Self {
        Self {
            reset_at: Some(at),
            ..Self::empty(subject)
        }
    }

    pub fn has_prompt(&self) -> bool {
        !self.rendered_prompt.trim().is_empty()
    }
}

/// Online/offline indicator carried by `user:status`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}
