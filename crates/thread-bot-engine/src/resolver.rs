//! Maps an origin message to the thread derived from it.
//!
//! Lookup walks an ordered chain of tiers with increasing cost and stops at the
//! first hit:
//!
//! 1. recent-message cache (in-memory scan, yields between chunks),
//! 2. threads already known to be open under the channel,
//! 3. authoritative fetch of the channel's active threads.
//!
//! Only the last tier can prove absence. Cache tiers may miss because of
//! eviction or staleness, so the authoritative tier always runs when they do,
//! and its failure is reported as [`ResolveError`] rather than as a miss.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::cache::{KnownThreadCache, RecentMessageCache};
use crate::ids::{ChannelId, MessageId};
use crate::transport::{ThreadHandle, ThreadTransport, TransportError};

pub const DEFAULT_CHUNKED_FIND_CHUNK_SIZE: usize = 100;
pub const DEFAULT_AUTHORITATIVE_FETCH_TIMEOUT_MS: u64 = 10_000;

#[async_trait]
/// One lookup strategy in the resolver chain.
pub trait ResolverTier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn try_resolve(
        &self,
        origin_message_id: MessageId,
        channel_id: ChannelId,
    ) -> Result<Option<ThreadHandle>, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found {
        thread: ThreadHandle,
        tier: &'static str,
    },
    /// Definitive: the authoritative tier answered and nothing matched.
    NotFound,
}

impl Resolution {
    pub fn thread(&self) -> Option<&ThreadHandle> {
        match self {
            Self::Found { thread, .. } => Some(thread),
            Self::NotFound => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("authoritative thread fetch for channel {channel_id} failed: {source}")]
    FetchFailed {
        channel_id: ChannelId,
        #[source]
        source: TransportError,
    },
    #[error("authoritative thread fetch for channel {channel_id} timed out after {timeout_ms}ms")]
    TimedOut { channel_id: ChannelId, timeout_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Messages scanned between cooperative yields; `0` scans in one pass.
    pub chunk_size: usize,
    /// Bound on the authoritative tier; zero disables the bound.
    pub authoritative_timeout: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNKED_FIND_CHUNK_SIZE,
            authoritative_timeout: Duration::from_millis(DEFAULT_AUTHORITATIVE_FETCH_TIMEOUT_MS),
        }
    }
}

/// Returns the first element matching `predicate`, yielding to the scheduler
/// after every `chunk_size` elements.
pub async fn chunked_find<'a, T, P>(
    items: &'a [T],
    chunk_size: usize,
    mut predicate: P,
) -> Option<&'a T>
where
    P: FnMut(&T) -> bool,
{
    if chunk_size == 0 {
        return items.iter().find(|item| predicate(item));
    }
    for chunk in items.chunks(chunk_size) {
        if let Some(found) = chunk.iter().find(|item| predicate(item)) {
            return Some(found);
        }
        tokio::task::yield_now().await;
    }
    None
}

/// Tier 1: scan of recently observed messages for the thread starter message.
pub struct RecentMessageTier {
    recent: Arc<RecentMessageCache>,
    known: Arc<KnownThreadCache>,
    chunk_size: usize,
}

impl RecentMessageTier {
    pub fn new(
        recent: Arc<RecentMessageCache>,
        known: Arc<KnownThreadCache>,
        chunk_size: usize,
    ) -> Self {
        Self {
            recent,
            known,
            chunk_size,
        }
    }
}

#[async_trait]
impl ResolverTier for RecentMessageTier {
    fn name(&self) -> &'static str {
        "recent_messages"
    }

    async fn try_resolve(
        &self,
        origin_message_id: MessageId,
        channel_id: ChannelId,
    ) -> Result<Option<ThreadHandle>, TransportError> {
        let snapshot = self.recent.snapshot();
        let starter = chunked_find(&snapshot, self.chunk_size, |message| {
            message.reference == Some(origin_message_id)
                && message.thread_parent == Some(channel_id)
        })
        .await;
        let Some(starter) = starter else {
            return Ok(None);
        };

        let thread = self
            .known
            .open_threads(channel_id)
            .into_iter()
            .find(|known| known.id == starter.channel_id)
            .unwrap_or_else(|| ThreadHandle {
                id: starter.channel_id,
                parent_id: channel_id,
                name: String::new(),
                archived: false,
            });
        Ok(Some(thread))
    }
}

/// Tier 2: first-message check of threads already known to be open.
pub struct KnownThreadTier {
    known: Arc<KnownThreadCache>,
    transport: Arc<dyn ThreadTransport>,
}

impl KnownThreadTier {
    pub fn new(known: Arc<KnownThreadCache>, transport: Arc<dyn ThreadTransport>) -> Self {
        Self { known, transport }
    }
}

#[async_trait]
impl ResolverTier for KnownThreadTier {
    fn name(&self) -> &'static str {
        "known_threads"
    }

    async fn try_resolve(
        &self,
        origin_message_id: MessageId,
        channel_id: ChannelId,
    ) -> Result<Option<ThreadHandle>, TransportError> {
        for thread in self.known.open_threads(channel_id) {
            match self.transport.thread_origin(&thread).await {
                Ok(Some(origin)) if origin == origin_message_id => return Ok(Some(thread)),
                Ok(_) => {}
                // A stale cached thread must not block the fallback to the authoritative tier.
                Err(error) => {
                    tracing::warn!(
                        thread_id = %thread.id,
                        error = %error,
                        "failed to read first message of cached thread"
                    );
                }
            }
        }
        Ok(None)
    }
}

/// Tier 3: full fetch of the channel's active threads.
pub struct AuthoritativeTier {
    transport: Arc<dyn ThreadTransport>,
}

impl AuthoritativeTier {
    pub fn new(transport: Arc<dyn ThreadTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ResolverTier for AuthoritativeTier {
    fn name(&self) -> &'static str {
        "active_threads_fetch"
    }

    async fn try_resolve(
        &self,
        origin_message_id: MessageId,
        channel_id: ChannelId,
    ) -> Result<Option<ThreadHandle>, TransportError> {
        let threads = self.transport.fetch_active_threads(channel_id).await?;
        for thread in threads {
            if self.transport.thread_origin(&thread).await? == Some(origin_message_id) {
                return Ok(Some(thread));
            }
        }
        Ok(None)
    }
}

pub struct ThreadResolver {
    cache_tiers: Vec<Arc<dyn ResolverTier>>,
    authoritative: Arc<dyn ResolverTier>,
    authoritative_timeout: Duration,
}

impl ThreadResolver {
    /// Builds the standard three-tier chain.
    pub fn new(
        recent: Arc<RecentMessageCache>,
        known: Arc<KnownThreadCache>,
        transport: Arc<dyn ThreadTransport>,
        options: ResolverOptions,
    ) -> Self {
        let recent_tier: Arc<dyn ResolverTier> = Arc::new(RecentMessageTier::new(
            recent,
            known.clone(),
            options.chunk_size,
        ));
        let known_tier: Arc<dyn ResolverTier> =
            Arc::new(KnownThreadTier::new(known, transport.clone()));
        Self::with_tiers(
            vec![recent_tier, known_tier],
            Arc::new(AuthoritativeTier::new(transport)),
            options.authoritative_timeout,
        )
    }

    /// Builds a chain from explicit tiers. Cache tiers run in the given order;
    /// the authoritative tier always runs last.
    pub fn with_tiers(
        cache_tiers: Vec<Arc<dyn ResolverTier>>,
        authoritative: Arc<dyn ResolverTier>,
        authoritative_timeout: Duration,
    ) -> Self {
        Self {
            cache_tiers,
            authoritative,
            authoritative_timeout,
        }
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.cache_tiers
            .iter()
            .chain(std::iter::once(&self.authoritative))
            .map(|tier| tier.name())
            .collect()
    }

    #[tracing::instrument(
        name = "thread_bot.resolver.resolve",
        skip(self),
        fields(origin_message_id = %origin_message_id, channel_id = %channel_id)
    )]
    pub async fn resolve(
        &self,
        origin_message_id: MessageId,
        channel_id: ChannelId,
    ) -> Result<Resolution, ResolveError> {
        for tier in &self.cache_tiers {
            match tier.try_resolve(origin_message_id, channel_id).await {
                Ok(Some(thread)) => {
                    tracing::info!(tier = tier.name(), thread_id = %thread.id, "thread found");
                    return Ok(Resolution::Found {
                        thread,
                        tier: tier.name(),
                    });
                }
                Ok(None) => {
                    tracing::debug!(tier = tier.name(), "tier missed");
                }
                Err(error) => {
                    tracing::warn!(tier = tier.name(), error = %error, "cache tier failed");
                }
            }
        }

        tracing::info!("thread not found in caches, fetching active threads");
        let lookup = self
            .authoritative
            .try_resolve(origin_message_id, channel_id);
        let outcome = if self.authoritative_timeout.is_zero() {
            lookup.await
        } else {
            match tokio::time::timeout(self.authoritative_timeout, lookup).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(ResolveError::TimedOut {
                        channel_id,
                        timeout_ms: self.authoritative_timeout.as_millis() as u64,
                    });
                }
            }
        };

        match outcome {
            Ok(Some(thread)) => {
                tracing::info!(
                    tier = self.authoritative.name(),
                    thread_id = %thread.id,
                    "thread found"
                );
                Ok(Resolution::Found {
                    thread,
                    tier: self.authoritative.name(),
                })
            }
            Ok(None) => Ok(Resolution::NotFound),
            Err(source) => Err(ResolveError::FetchFailed { channel_id, source }),
        }
    }
}
