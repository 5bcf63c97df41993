//! Transport-neutral chat events delivered to the engine.

use crate::ids::{ChannelId, MessageId, UserId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// The parts of a rich embed the engine inspects.
pub struct EmbedSummary {
    pub title: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A message posted to a guild channel or thread.
pub struct InboundMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub author_is_bot: bool,
    pub content: String,
    pub embeds: Vec<EmbedSummary>,
    /// Message this one replies to (thread starter messages point at their origin).
    pub reference: Option<MessageId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageDeletion {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates the events the transport hands to the engine.
pub enum ChatEvent {
    Message(InboundMessage),
    MessageDeleted(MessageDeletion),
}

impl ChatEvent {
    /// Channel that owns the event; used to pick the sequential worker.
    pub fn channel_id(&self) -> ChannelId {
        match self {
            Self::Message(message) => message.channel_id,
            Self::MessageDeleted(deletion) => deletion.channel_id,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::MessageDeleted(_) => "message_deleted",
        }
    }
}
