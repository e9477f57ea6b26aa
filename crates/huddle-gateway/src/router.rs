//! Message router
//!
//! Validates, persists, forwards and acknowledges chat messages. A message
//! is only forwarded after it has been stored, and the sender's
//! acknowledgement is enqueued after every forward.

use crate::presence::{deliver, ConnectionHandle, PresenceRegistry};
use huddle_core::{
    ChatMessage, Error, GroupId, GroupNotification, OutboundEvent, Recipient, Result, Subject,
    UserId,
};
use huddle_store::MessageStore;
use huddle_style::StyleScheduler;
use std::sync::Arc;
use tracing::{debug, error};

pub struct MessageRouter {
    store: Arc<dyn MessageStore>,
    presence: Arc<PresenceRegistry>,
    scheduler: Arc<StyleScheduler>,
}

fn require_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::InvalidMessage("message content is empty".into()));
    }
    Ok(())
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn MessageStore>,
        presence: Arc<PresenceRegistry>,
        scheduler: Arc<StyleScheduler>,
    ) -> Self {
        Self {
            store,
            presence,
            scheduler,
        }
    }

    async fn persist(&self, message: ChatMessage) -> Result<ChatMessage> {
        self.store.insert_message(message).await.map_err(|e| {
            error!("Failed to persist message: {}", e);
            e
        })
    }

    /// Current members of a group, requiring `user` to be one of them.
    pub async fn members_for(&self, group: &GroupId, user: &UserId) -> Result<Vec<UserId>> {
        let members = self.store.query_group_members(group).await?;
        if !members.contains(user) {
            return Err(Error::AuthorizationFailure(format!(
                "{} is not a member of group {}",
                user, group
            )));
        }
        Ok(members)
    }

    /// Live connections for a recipient: the user, or every online member.
    pub async fn resolve_online(&self, recipient: &Recipient) -> Result<Vec<ConnectionHandle>> {
        let users = match recipient {
            Recipient::User(user) => vec![user.clone()],
            Recipient::Group(group) => self.store.query_group_members(group).await?,
        };
        let mut online = Vec::with_capacity(users.len());
        for user in &users {
            if let Some(handle) = self.presence.lookup(user).await {
                online.push(handle);
            }
        }
        Ok(online)
    }

    /// Route a direct message from `from` to `to`.
    pub async fn route_direct(
        &self,
        from: &ConnectionHandle,
        to: UserId,
        content: String,
    ) -> Result<ChatMessage> {
        require_content(&content)?;
        if !self.store.user_exists(&to).await? {
            return Err(Error::NotFound(format!("user {}", to)));
        }

        let message = self
            .persist(ChatMessage::new(
                from.user.clone(),
                Recipient::User(to.clone()),
                content,
            ))
            .await?;

        if to != from.user {
            let delivered = self
                .presence
                .send_to(
                    &to,
                    OutboundEvent::MessageReceive {
                        message: message.clone(),
                    },
                )
                .await;
            if !delivered {
                debug!("{} offline, message {} stored only", to, message.id);
            }
        }

        deliver(
            from,
            OutboundEvent::MessageSent {
                message: message.clone(),
            },
        );
        self.scheduler.observe(Subject::User(from.user.clone()));
        Ok(message)
    }

    /// Route a message to every online member of a group except the sender.
    pub async fn route_group(
        &self,
        from: &ConnectionHandle,
        group: GroupId,
        content: String,
    ) -> Result<ChatMessage> {
        require_content(&content)?;
        let members = self.members_for(&group, &from.user).await?;

        let message = self
            .persist(ChatMessage::new(
                from.user.clone(),
                Recipient::Group(group.clone()),
                content,
            ))
            .await?;

        for member in members.iter().filter(|m| **m != from.user) {
            self.presence
                .send_to(
                    member,
                    OutboundEvent::GroupMessageReceive {
                        message: message.clone(),
                    },
                )
                .await;
        }

        deliver(
            from,
            OutboundEvent::GroupMessageSent {
                message: message.clone(),
            },
        );
        self.scheduler.observe(Subject::User(from.user.clone()));
        self.scheduler.observe(Subject::Group(group));
        Ok(message)
    }

    /// Store a user's message to their companion. Nothing is forwarded; the
    /// reply arrives as a generation stream.
    pub async fn route_to_companion(
        &self,
        from: &ConnectionHandle,
        content: String,
    ) -> Result<ChatMessage> {
        require_content(&content)?;
        let message = self
            .persist(ChatMessage::new(
                from.user.clone(),
                Recipient::User(UserId::companion()),
                content,
            ))
            .await?;
        deliver(
            from,
            OutboundEvent::MessageSent {
                message: message.clone(),
            },
        );
        self.scheduler.observe(Subject::User(from.user.clone()));
        Ok(message)
    }

    /// Store an agent reply. Generated messages never trigger style updates.
    pub async fn record_generated(
        &self,
        agent: UserId,
        recipient: Recipient,
        content: String,
    ) -> Result<ChatMessage> {
        self.persist(ChatMessage::generated(agent, recipient, content))
            .await
    }

    pub async fn user_typing(&self, from: &ConnectionHandle, to: &UserId) {
        self.presence
            .send_to(
                to,
                OutboundEvent::UserTyping {
                    user_id: from.user.clone(),
                },
            )
            .await;
    }

    pub async fn group_typing(&self, from: &ConnectionHandle, group: GroupId) -> Result<()> {
        let members = self.members_for(&group, &from.user).await?;
        for member in members.iter().filter(|m| **m != from.user) {
            self.presence
                .send_to(
                    member,
                    OutboundEvent::GroupTyping {
                        group_id: group.clone(),
                        user_id: from.user.clone(),
                    },
                )
                .await;
        }
        Ok(())
    }

    /// Answer with one `user:status` per requested user.
    pub async fn check_status(&self, from: &ConnectionHandle, users: Vec<UserId>) {
        for user in users {
            let status = self.presence.status(&user).await;
            deliver(from, OutboundEvent::status(user, status));
        }
    }

    /// Fan a membership change out to the group's online members. The user
    /// being added or removed is told as well. Returns how many connections
    /// were reached.
    pub async fn notify_group(
        &self,
        group: GroupId,
        notification: GroupNotification,
    ) -> Result<usize> {
        let mut targets = self.store.query_group_members(&group).await?;
        if let GroupNotification::MemberAdded { user_id } | GroupNotification::MemberRemoved { user_id } =
            &notification
        {
            if !targets.contains(user_id) {
                targets.push(user_id.clone());
            }
        }

        let event = notification.into_event(group);
        let mut reached = 0;
        for user in &targets {
            if self.presence.send_to(user, event.clone()).await {
                reached += 1;
            }
        }
        debug!("{} delivered to {} of {} users", event.name(), reached, targets.len());
        Ok(reached)
    }
}
