//! Per-channel aggregation of split nomination vote announcements.
//!
//! A vote announcement may arrive as several bot messages. The first one
//! matches the opener pattern and names the nominee; the last one always ends
//! with the same reaction prompt. Completion is detected by that suffix, so the
//! number of fragments in between does not matter.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::classifier::VoteFragment;
use crate::ids::{ChannelId, MessageId, UserId};

pub const NOMINATION_OPENER_PATTERN: &str =
    r"^<@!?(\d+)> \((.+)#(\d{4})\) for Helper!\n\n\*\*Nominated by:\*\*";

/// Reaction prompts that terminate a vote announcement.
pub const NOMINATION_CLOSING_MARKERS: [&str; 2] = [
    "react :+1: for approval, or :-1: for disapproval*.",
    "react 👍 for approval, or 👎 for disapproval*.",
];

fn opener_regex() -> &'static Regex {
    static OPENER: OnceLock<Regex> = OnceLock::new();
    OPENER.get_or_init(|| {
        Regex::new(NOMINATION_OPENER_PATTERN).expect("nomination opener pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Subject details captured from an opener fragment.
pub struct NominationOpener {
    pub nominee_id: UserId,
    pub subject: String,
}

/// Parses the opener pattern at the start of `text`.
pub fn parse_nomination_opener(text: &str) -> Option<NominationOpener> {
    let captures = opener_regex().captures(text)?;
    let nominee_id = captures.get(1)?.as_str().parse::<u64>().ok()?;
    let subject = captures.get(2)?.as_str().trim();
    if subject.is_empty() {
        return None;
    }
    Some(NominationOpener {
        nominee_id: UserId(nominee_id),
        subject: subject.to_string(),
    })
}

pub fn ends_with_closing_marker(text: &str) -> bool {
    let trimmed = text.trim_end();
    NOMINATION_CLOSING_MARKERS
        .iter()
        .any(|marker| trimmed.ends_with(marker))
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Partial trigger state held while a vote announcement is still arriving.
pub struct Trigger {
    pub channel_id: ChannelId,
    pub subject: Option<String>,
    pub nominee_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A finished vote announcement, ready for thread creation.
pub struct CompletedTrigger {
    pub channel_id: ChannelId,
    pub subject: String,
    pub nominee_id: Option<UserId>,
    /// The closing fragment; the thread is started on this message.
    pub origin_message_id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatorAnomaly {
    /// A second opener arrived while one was pending; the newer one wins.
    DuplicateOpener {
        channel_id: ChannelId,
        discarded_subject: String,
        replacement_subject: String,
    },
    /// A closing fragment arrived with no pending subject.
    OrphanCloser {
        channel_id: ChannelId,
        message_id: MessageId,
    },
}

impl AggregatorAnomaly {
    pub fn counter_name(&self) -> &'static str {
        match self {
            Self::DuplicateOpener { .. } => "trigger.anomaly.duplicate_opener",
            Self::OrphanCloser { .. } => "trigger.anomaly.orphan_closer",
        }
    }
}

#[derive(Debug, Default)]
/// Owns the pending trigger of every voting channel.
pub struct TriggerAggregator {
    pending: HashMap<ChannelId, Trigger>,
    anomalies: Vec<AggregatorAnomaly>,
}

impl TriggerAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self, channel_id: ChannelId) -> Option<&Trigger> {
        self.pending.get(&channel_id)
    }

    /// Drains anomalies recorded since the last call.
    pub fn take_anomalies(&mut self) -> Vec<AggregatorAnomaly> {
        std::mem::take(&mut self.anomalies)
    }

    pub fn feed(&mut self, fragment: &VoteFragment) -> Option<CompletedTrigger> {
        let channel_id = fragment.channel_id;

        if let Some(opener) = parse_nomination_opener(&fragment.text) {
            self.open(channel_id, opener);
        }

        if !ends_with_closing_marker(&fragment.text) {
            return None;
        }

        let subject = self
            .pending
            .remove(&channel_id)
            .and_then(|trigger| trigger.subject.map(|subject| (subject, trigger.nominee_id)));
        match subject {
            Some((subject, nominee_id)) => {
                tracing::debug!(
                    channel_id = %channel_id,
                    message_id = %fragment.message_id,
                    subject = %subject,
                    "nomination vote announcement complete"
                );
                Some(CompletedTrigger {
                    channel_id,
                    subject,
                    nominee_id,
                    origin_message_id: fragment.message_id,
                })
            }
            None => {
                tracing::warn!(
                    channel_id = %channel_id,
                    message_id = %fragment.message_id,
                    "vote closing marker seen with no pending nomination"
                );
                self.anomalies.push(AggregatorAnomaly::OrphanCloser {
                    channel_id,
                    message_id: fragment.message_id,
                });
                None
            }
        }
    }

    fn open(&mut self, channel_id: ChannelId, opener: NominationOpener) {
        let replaced = self.pending.insert(
            channel_id,
            Trigger {
                channel_id,
                subject: Some(opener.subject.clone()),
                nominee_id: Some(opener.nominee_id),
            },
        );
        if let Some(previous) = replaced {
            let discarded_subject = previous.subject.unwrap_or_default();
            tracing::warn!(
                channel_id = %channel_id,
                discarded = %discarded_subject,
                replacement = %opener.subject,
                "nomination opener arrived while another vote was pending"
            );
            self.anomalies.push(AggregatorAnomaly::DuplicateOpener {
                channel_id,
                discarded_subject,
                replacement_subject: opener.subject,
            });
        }
    }
}
