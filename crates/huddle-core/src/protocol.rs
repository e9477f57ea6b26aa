//! WebSocket protocol — tagged event frames
//!
//! Wire format (both directions):
//!
//!   { "event": "message:send", "data": { "toUserId": "bob", "content": "hi" } }
//!
//! Client → Server events are [`InboundEvent`], Server → Client events are
//! [`OutboundEvent`]. Event names are the interoperability boundary with
//! existing clients and must not change.
//!
//! Authentication happens on the HTTP upgrade, never in-band.

use crate::types::{ChatMessage, GroupId, PresenceStatus, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "message:send", rename_all = "camelCase")]
    MessageSend { to_user_id: UserId, content: String },

    #[serde(rename = "user:typing", rename_all = "camelCase")]
    UserTyping { to_user_id: UserId },

    #[serde(rename = "user:check-status", rename_all = "camelCase")]
    UserCheckStatus { user_ids: Vec<UserId> },

    #[serde(rename = "agent:message")]
    AgentMessage { content: String },

    #[serde(rename = "agent:reset")]
    AgentReset {},

    #[serde(rename = "group:message:send", rename_all = "camelCase")]
    GroupMessageSend { group_id: GroupId, content: String },

    #[serde(rename = "group:typing", rename_all = "camelCase")]
    GroupTyping { group_id: GroupId },

    #[serde(rename = "group:agent:mention", rename_all = "camelCase")]
    GroupAgentMention { group_id: GroupId, content: String },
}

impl InboundEvent {
    pub fn parse(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).map_err(|e| crate::Error::InvalidMessage(e.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageSend { .. } => "message:send",
            Self::UserTyping { .. } => "user:typing",
            Self::UserCheckStatus { .. } => "user:check-status",
            Self::AgentMessage { .. } => "agent:message",
            Self::AgentReset {} => "agent:reset",
            Self::GroupMessageSend { .. } => "group:message:send",
            Self::GroupTyping { .. } => "group:typing",
            Self::GroupAgentMention { .. } => "group:agent:mention",
        }
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "user:status", rename_all = "camelCase")]
    UserStatus {
        user_id: UserId,
        status: PresenceStatus,
    },

    #[serde(rename = "user:typing", rename_all = "camelCase")]
    UserTyping { user_id: UserId },

    #[serde(rename = "message:receive")]
    MessageReceive { message: ChatMessage },

    #[serde(rename = "message:sent")]
    MessageSent { message: ChatMessage },

    #[serde(rename = "message:error", rename_all = "camelCase")]
    MessageError {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_user_id: Option<UserId>,
    },

    #[serde(rename = "agent:stream-start", rename_all = "camelCase")]
    AgentStreamStart { stream_id: Uuid },

    #[serde(rename = "agent:stream-chunk", rename_all = "camelCase")]
    AgentStreamChunk { stream_id: Uuid, chunk: String },

    #[serde(rename = "agent:stream-end", rename_all = "camelCase")]
    AgentStreamEnd {
        stream_id: Uuid,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<ChatMessage>,
    },

    #[serde(rename = "agent:error", rename_all = "camelCase")]
    AgentError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<Uuid>,
        error: String,
    },

    #[serde(rename = "agent:reset")]
    AgentReset {},

    #[serde(rename = "group:message:receive")]
    GroupMessageReceive { message: ChatMessage },

    #[serde(rename = "group:message:sent")]
    GroupMessageSent { message: ChatMessage },

    #[serde(rename = "group:message:error", rename_all = "camelCase")]
    GroupMessageError { group_id: GroupId, error: String },

    #[serde(rename = "group:typing", rename_all = "camelCase")]
    GroupTyping { group_id: GroupId, user_id: UserId },

    #[serde(rename = "group:agent:stream-start", rename_all = "camelCase")]
    GroupAgentStreamStart { group_id: GroupId, stream_id: Uuid },

    #[serde(rename = "group:agent:stream-chunk", rename_all = "camelCase")]
    GroupAgentStreamChunk {
        group_id: GroupId,
        stream_id: Uuid,
        chunk: String,
    },

    #[serde(rename = "group:agent:stream-end", rename_all = "camelCase")]
    GroupAgentStreamEnd {
        group_id: GroupId,
        stream_id: Uuid,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<ChatMessage>,
    },

    #[serde(rename = "group:agent:error", rename_all = "camelCase")]
    GroupAgentError {
        group_id: GroupId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<Uuid>,
        error: String,
    },

    #[serde(rename = "group:member:added", rename_all = "camelCase")]
    GroupMemberAdded { group_id: GroupId, user_id: UserId },

    #[serde(rename = "group:member:removed", rename_all = "camelCase")]
    GroupMemberRemoved { group_id: GroupId, user_id: UserId },

    #[serde(rename = "group:deleted", rename_all = "camelCase")]
    GroupDeleted { group_id: GroupId },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserStatus { .. } => "user:status",
            Self::UserTyping { .. } => "user:typing",
            Self::MessageReceive { .. } => "message:receive",
            Self::MessageSent { .. } => "message:sent",
            Self::MessageError { .. } => "message:error",
            Self::AgentStreamStart { .. } => "agent:stream-start",
            Self::AgentStreamChunk { .. } => "agent:stream-chunk",
            Self::AgentStreamEnd { .. } => "agent:stream-end",
            Self::AgentError { .. } => "agent:error",
            Self::AgentReset {} => "agent:reset",
            Self::GroupMessageReceive { .. } => "group:message:receive",
            Self::GroupMessageSent { .. } => "group:message:sent",
            Self::GroupMessageError { .. } => "group:message:error",
            Self::GroupTyping { .. } => "group:typing",
            Self::GroupAgentStreamStart { .. } => "group:agent:stream-start",
            Self::GroupAgentStreamChunk { .. } => "group:agent:stream-chunk",
            Self::GroupAgentStreamEnd { .. } => "group:agent:stream-end",
            Self::GroupAgentError { .. } => "group:agent:error",
            Self::GroupMemberAdded { .. } => "group:member:added",
            Self::GroupMemberRemoved { .. } => "group:member:removed",
            Self::GroupDeleted { .. } => "group:deleted",
        }
    }

    pub fn status(user_id: UserId, status: PresenceStatus) -> Self {
        Self::UserStatus { user_id, status }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Stream scope — picks the agent:* or group:agent:* event family
// ---------------------------------------------------------------------------

/// Which agent a generation stream belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamScope {
    /// Single-user companion agent.
    Companion,
    /// Group-wide collective agent.
    Group(GroupId),
}

impl StreamScope {
    pub fn start(&self, stream_id: Uuid) -> OutboundEvent {
        match self {
            Self::Companion => OutboundEvent::AgentStreamStart { stream_id },
            Self::Group(group_id) => OutboundEvent::GroupAgentStreamStart {
                group_id: group_id.clone(),
                stream_id,
            },
        }
    }

    pub fn chunk(&self, stream_id: Uuid, chunk: impl Into<String>) -> OutboundEvent {
        let chunk = chunk.into();
        match self {
            Self::Companion => OutboundEvent::AgentStreamChunk { stream_id, chunk },
            Self::Group(group_id) => OutboundEvent::GroupAgentStreamChunk {
                group_id: group_id.clone(),
                stream_id,
                chunk,
            },
        }
    }

    pub fn end(
        &self,
        stream_id: Uuid,
        content: impl Into<String>,
        message: Option<ChatMessage>,
    ) -> OutboundEvent {
        let content = content.into();
        match self {
            Self::Companion => OutboundEvent::AgentStreamEnd {
                stream_id,
                content,
                message,
            },
            Self::Group(group_id) => OutboundEvent::GroupAgentStreamEnd {
                group_id: group_id.clone(),
                stream_id,
                content,
                message,
            },
        }
    }

    pub fn error(&self, stream_id: Option<Uuid>, error: impl Into<String>) -> OutboundEvent {
        let error = error.into();
        match self {
            Self::Companion => OutboundEvent::AgentError { stream_id, error },
            Self::Group(group_id) => OutboundEvent::GroupAgentError {
                group_id: group_id.clone(),
                stream_id,
                error,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Membership notifications pushed by the external membership service
// ---------------------------------------------------------------------------

/// Body of `POST /groups/{groupId}/events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupNotification {
    #[serde(rename_all = "camelCase")]
    MemberAdded { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    MemberRemoved { user_id: UserId },
    Deleted,
}

impl GroupNotification {
    pub fn into_event(self, group_id: GroupId) -> OutboundEvent {
        match self {
            Self::MemberAdded { user_id } => OutboundEvent::GroupMemberAdded { group_id, user_id },
            Self::MemberRemoved { user_id } => {
                OutboundEvent::GroupMemberRemoved { group_id, user_id }
            }
            Self::Deleted => OutboundEvent::GroupDeleted { group_id },
        }
    }
}
