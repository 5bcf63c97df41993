//! Collaborator contract for the chat transport.
//!
//! The engine never talks to the chat platform directly; it drives an
//! implementation of [`ThreadTransport`] supplied at startup.

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::{ChannelId, MessageId, RoleId};

#[derive(Debug, Clone, PartialEq, Eq)]
/// A thread channel as known to the transport.
pub struct ThreadHandle {
    pub id: ChannelId,
    pub parent_id: ChannelId,
    pub name: String,
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub id: MessageId,
    pub channel_id: ChannelId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Minimal embed used for notices.
pub struct OutboundEmbed {
    pub author_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub content: String,
    pub embed: Option<OutboundEmbed>,
    /// Roles allowed to be pinged by this message.
    pub allowed_role_mentions: Vec<RoleId>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            embed: None,
            allowed_role_mentions: Vec::new(),
        }
    }

    pub fn with_role_mentions(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        self.allowed_role_mentions.extend(roles);
        self
    }

    pub fn with_embed(mut self, embed: OutboundEmbed) -> Self {
        self.embed = Some(embed);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateThreadRequest {
    pub channel_id: ChannelId,
    pub origin_message_id: MessageId,
    pub name: String,
    pub auto_archive_minutes: u32,
}

#[derive(Debug, Error)]
/// Enumerates transport failures surfaced to the engine.
pub enum TransportError {
    #[error("{operation} failed with status {status}: {body}")]
    HttpStatus {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("{operation} request failed: {message}")]
    Request { operation: String, message: String },
    #[error("failed to decode {operation} response: {message}")]
    Decode { operation: String, message: String },
    #[error("{operation} response missing {field}")]
    MissingField {
        operation: String,
        field: &'static str,
    },
}

impl TransportError {
    pub fn request(operation: &str, message: impl Into<String>) -> Self {
        Self::Request {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
/// Chat platform operations the engine depends on.
pub trait ThreadTransport: Send + Sync {
    async fn send_message(
        &self,
        channel_id: ChannelId,
        message: OutboundMessage,
    ) -> Result<MessageHandle, TransportError>;

    async fn create_thread(
        &self,
        request: CreateThreadRequest,
    ) -> Result<ThreadHandle, TransportError>;

    async fn edit_thread_archived(
        &self,
        thread: &ThreadHandle,
        archived: bool,
    ) -> Result<(), TransportError>;

    /// Authoritative list of active threads whose parent is `channel_id`.
    async fn fetch_active_threads(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<ThreadHandle>, TransportError>;

    /// Reply reference of the oldest message in `thread`, if any.
    async fn thread_origin(
        &self,
        thread: &ThreadHandle,
    ) -> Result<Option<MessageId>, TransportError>;
}
