//! Event classification for the nomination and ban-appeal workflows.
//!
//! Classification is pure: it never touches caches or aggregation state and it
//! never fails. Anything it does not recognise is [`Classification::Ignore`].

use crate::event::{ChatEvent, EmbedSummary, InboundMessage, MessageDeletion};
use crate::ids::{ChannelId, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Channels whose events feed the workflows.
pub struct WatchedChannels {
    pub nomination_voting: ChannelId,
    /// `None` disables the ban-appeal workflow.
    pub appeals: Option<ChannelId>,
}

impl WatchedChannels {
    pub fn is_watched(&self, channel_id: ChannelId) -> bool {
        channel_id == self.nomination_voting || self.appeals == Some(channel_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One bot-authored message from the nomination voting channel.
pub struct VoteFragment {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A forms webhook message announcing a new ban appeal.
pub struct AppealSignal {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub response_uuid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A deleted message in a watched channel that may have produced a thread.
pub struct Deletion {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Ignore,
    VoteFragment(VoteFragment),
    AppealSignal(AppealSignal),
    Deletion(Deletion),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Key used by the handler table.
pub enum ClassificationKind {
    VoteFragment,
    AppealSignal,
    Deletion,
}

impl ClassificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VoteFragment => "vote_fragment",
            Self::AppealSignal => "appeal_signal",
            Self::Deletion => "deletion",
        }
    }
}

impl Classification {
    pub fn kind(&self) -> Option<ClassificationKind> {
        match self {
            Self::Ignore => None,
            Self::VoteFragment(_) => Some(ClassificationKind::VoteFragment),
            Self::AppealSignal(_) => Some(ClassificationKind::AppealSignal),
            Self::Deletion(_) => Some(ClassificationKind::Deletion),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventClassifier {
    channels: WatchedChannels,
}

impl EventClassifier {
    pub fn new(channels: WatchedChannels) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> WatchedChannels {
        self.channels
    }

    pub fn classify(&self, event: &ChatEvent) -> Classification {
        match event {
            ChatEvent::Message(message) => self.classify_message(message),
            ChatEvent::MessageDeleted(deletion) => self.classify_deletion(deletion),
        }
    }

    fn classify_message(&self, message: &InboundMessage) -> Classification {
        if !message.author_is_bot {
            return Classification::Ignore;
        }

        if message.channel_id == self.channels.nomination_voting {
            return Classification::VoteFragment(VoteFragment {
                message_id: message.id,
                channel_id: message.channel_id,
                text: message.content.clone(),
            });
        }

        if self.channels.appeals == Some(message.channel_id) {
            let [embed] = message.embeds.as_slice() else {
                return Classification::Ignore;
            };
            let Some(response_uuid) = appeal_response_uuid(embed) else {
                return Classification::Ignore;
            };
            return Classification::AppealSignal(AppealSignal {
                message_id: message.id,
                channel_id: message.channel_id,
                response_uuid,
            });
        }

        Classification::Ignore
    }

    fn classify_deletion(&self, deletion: &MessageDeletion) -> Classification {
        if !self.channels.is_watched(deletion.channel_id) {
            return Classification::Ignore;
        }
        Classification::Deletion(Deletion {
            message_id: deletion.message_id,
            channel_id: deletion.channel_id,
        })
    }
}

/// Extracts the forms response id from the last path segment of the embed url.
pub fn appeal_response_uuid(embed: &EmbedSummary) -> Option<String> {
    let url = embed.url.as_deref()?.trim();
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
}
