//! Persistence contract

use chrono::{DateTime, Utc};
use huddle_core::{ChatMessage, GroupId, Recipient, Result, StyleModel, Subject, UserId};

/// Selects stored messages.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageFilter {
    pub sender: Option<UserId>,
    pub recipient: Option<Recipient>,
    pub include_generated: bool,
    /// Skip messages created before this instant.
    pub since: Option<DateTime<Utc>>,
    /// Keep only the most recent `limit` matches.
    pub limit: Option<usize>,
}

impl MessageFilter {
    /// Messages a style model for `subject` may learn from. Generated
    /// messages never count, so an agent does not learn its own voice.
    pub fn eligible_for(subject: &Subject) -> Self {
        match subject {
            Subject::User(user) => Self {
                sender: Some(user.clone()),
                ..Default::default()
            },
            Subject::Group(group) => Self {
                recipient: Some(Recipient::Group(group.clone())),
                ..Default::default()
            },
        }
    }

    pub fn since(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.since = at;
        self
    }

    pub fn matches(&self, message: &ChatMessage) -> bool {
        if message.generated && !self.include_generated {
            return false;
        }
        if let Some(sender) = &self.sender {
            if &message.sender_id != sender {
                return false;
            }
        }
        if let Some(recipient) = &self.recipient {
            if &message.recipient != recipient {
                return false;
            }
        }
        if let Some(since) = self.since {
            if message.created_at < since {
                return false;
            }
        }
        true
    }
}

/// Relational store holding messages, group membership, and style models.
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message. Returns the stored record.
    async fn insert_message(&self, message: ChatMessage) -> Result<ChatMessage>;

    /// Matching messages, oldest first.
    async fn query_messages(&self, filter: &MessageFilter) -> Result<Vec<ChatMessage>>;

    async fn count_messages(&self, filter: &MessageFilter) -> Result<u64>;

    /// Current members. `Error::NotFound` when the group does not exist.
    async fn query_group_members(&self, group: &GroupId) -> Result<Vec<UserId>>;

    async fn user_exists(&self, user: &UserId) -> Result<bool>;

    /// Store a recomputed model. A model computed before the stored model's
    /// last reset, or with a lower `observed_message_count` since the same
    /// reset, is ignored.
    async fn upsert_style_model(&self, model: StyleModel) -> Result<()>;

    async fn get_style_model(&self, subject: &Subject) -> Result<Option<StyleModel>>;

    /// Replace the model with an empty one stamped with the reset time.
    /// Older messages no longer count toward the subject's style.
    async fn reset_style_model(&self, subject: &Subject) -> Result<()>;
}
