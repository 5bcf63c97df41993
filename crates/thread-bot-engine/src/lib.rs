//! Thread correlation and lifecycle engine for the moderation bot.
//!
//! Classifies chat events, aggregates split nomination votes into triggers,
//! resolves origin messages to their threads through cache tiers, and opens
//! or archives threads through a [`transport::ThreadTransport`].

pub mod aggregator;
pub mod appeal;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod handlers;
pub mod ids;
pub mod lifecycle;
pub mod resolver;
pub mod stats;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use aggregator::{CompletedTrigger, TriggerAggregator};
pub use appeal::{AppealDetails, AppealFetchError, AppealResponseCatalog, AppealSource};
pub use cache::{CachedMessage, KnownThreadCache, RecentMessageCache};
pub use classifier::{Classification, ClassificationKind, EventClassifier, WatchedChannels};
pub use config::{EngineConfig, StaffRoles};
pub use dispatch::{ChannelDispatcher, DispatchError};
pub use engine::Engine;
pub use error::EngineError;
pub use event::{ChatEvent, EmbedSummary, InboundMessage, MessageDeletion};
pub use ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
pub use lifecycle::{ArchiveOutcome, CreateOutcome, LifecycleController, ThreadKind};
pub use resolver::{Resolution, ResolveError, ResolverOptions, ThreadResolver};
pub use stats::{InMemoryStats, NoopStats, StatsSink};
pub use transport::{
    CreateThreadRequest, MessageHandle, OutboundEmbed, OutboundMessage, ThreadHandle,
    ThreadTransport, TransportError,
};
