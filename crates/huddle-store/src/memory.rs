//! In-memory persistence

use crate::message::{MessageFilter, MessageStore};
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use huddle_core::{ChatMessage, Error, GroupId, Result, StyleModel, Subject, UserId};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Process-local [`MessageStore`]. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    messages: RwLock<Vec<ChatMessage>>,
    users: DashSet<UserId>,
    groups: DashMap<GroupId, Vec<UserId>>,
    models: DashMap<Subject, StyleModel>,
    writes_fail: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: impl Into<UserId>) {
        self.users.insert(user.into());
    }

    /// Create or replace a group. Members are registered as users.
    pub fn set_group<I, U>(&self, group: impl Into<GroupId>, members: I)
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        let members: Vec<UserId> = members.into_iter().map(Into::into).collect();
        for m in &members {
            self.users.insert(m.clone());
        }
        self.groups.insert(group.into(), members);
    }

    pub fn remove_group(&self, group: &GroupId) {
        self.groups.remove(group);
    }

    /// Make every write fail with a persistence error.
    pub fn fail_writes(&self, fail: bool) {
        self.writes_fail.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.writes_fail.load(Ordering::SeqCst) {
            return Err(Error::persistence("store unavailable"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, message: ChatMessage) -> Result<ChatMessage> {
        self.check_writable()?;
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn query_messages(&self, filter: &MessageFilter) -> Result<Vec<ChatMessage>> {
        let messages = self.messages.read().await;
        let mut matched: Vec<ChatMessage> =
            messages.iter().filter(|m| filter.matches(m)).cloned().collect();
        if let Some(limit) = filter.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        Ok(matched)
    }

    async fn count_messages(&self, filter: &MessageFilter) -> Result<u64> {
        let messages = self.messages.read().await;
        let count = messages.iter().filter(|m| filter.matches(m)).count();
        Ok(match filter.limit {
            Some(limit) => count.min(limit) as u64,
            None => count as u64,
        })
    }

    async fn query_group_members(&self, group: &GroupId) -> Result<Vec<UserId>> {
        self.groups
            .get(group)
            .map(|members| members.clone())
            .ok_or_else(|| Error::NotFound(format!("group {}", group)))
    }

    async fn user_exists(&self, user: &UserId) -> Result<bool> {
        Ok(self.users.contains(user))
    }

    async fn upsert_style_model(&self, model: StyleModel) -> Result<()> {
        self.check_writable()?;
        let mut entry = self
            .models
            .entry(model.subject.clone())
            .or_insert_with(|| StyleModel::empty(model.subject.clone()));
        if model.reset_at < entry.reset_at {
            debug!(subject = %model.subject, "Ignoring style model computed before reset");
            return Ok(());
        }
        if model.reset_at == entry.reset_at
            && model.observed_message_count < entry.observed_message_count
        {
            debug!(
                subject = %model.subject,
                stored = entry.observed_message_count,
                offered = model.observed_message_count,
                "Ignoring older style model"
            );
            return Ok(());
        }
        *entry = model;
        Ok(())
    }

    async fn get_style_model(&self, subject: &Subject) -> Result<Option<StyleModel>> {
        Ok(self.models.get(subject).map(|m| m.clone()))
    }

    async fn reset_style_model(&self, subject: &Subject) -> Result<()> {
        self.check_writable()?;
        self.models
            .insert(subject.clone(), StyleModel::reset(subject.clone(), Utc::now()));
        Ok(())
    }
}
