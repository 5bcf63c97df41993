//! Thread creation and archival.
//!
//! Every origin message gets at most one [`ThreadRecord`], which moves
//! `Pending -> Created -> Archived` and never backwards. The ledger is a local
//! mirror; the chat platform remains the authoritative thread store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::aggregator::CompletedTrigger;
use crate::appeal::{AppealFetchError, AppealSource, FORMS_CREDENTIALS_INVALID_NOTICE};
use crate::cache::KnownThreadCache;
use crate::classifier::{AppealSignal, Deletion};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ids::{ChannelId, MessageId};
use crate::resolver::{Resolution, ThreadResolver};
use crate::stats::StatsSink;
use crate::transport::{CreateThreadRequest, OutboundMessage, ThreadHandle, ThreadTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadKind {
    Nomination,
    BanAppeal,
}

impl ThreadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nomination => "nomination",
            Self::BanAppeal => "ban_appeal",
        }
    }

    pub fn open_counter(self) -> &'static str {
        match self {
            Self::Nomination => "thread.nomination.open",
            Self::BanAppeal => "thread.ban_appeal.open",
        }
    }

    pub fn archive_counter(self) -> &'static str {
        match self {
            Self::Nomination => "thread.nomination.archive",
            Self::BanAppeal => "thread.ban_appeal.archive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Pending,
    Created,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
    pub origin_message_id: MessageId,
    pub channel_id: ChannelId,
    pub kind: ThreadKind,
    pub thread_id: Option<ChannelId>,
    pub state: LifecycleState,
}

impl ThreadRecord {
    pub fn archived(&self) -> bool {
        self.state == LifecycleState::Archived
    }
}

#[derive(Debug, Default)]
/// Local record of every origin this process has acted on.
pub struct ThreadLedger {
    records: Mutex<HashMap<MessageId, ThreadRecord>>,
}

impl ThreadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, origin_message_id: MessageId) -> Option<ThreadRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&origin_message_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claims `origin_message_id` for a new thread. Returns the existing record
    /// when the origin was already claimed.
    fn begin(
        &self,
        origin_message_id: MessageId,
        channel_id: ChannelId,
        kind: ThreadKind,
    ) -> Result<(), ThreadRecord> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = records.get(&origin_message_id) {
            return Err(existing.clone());
        }
        records.insert(
            origin_message_id,
            ThreadRecord {
                origin_message_id,
                channel_id,
                kind,
                thread_id: None,
                state: LifecycleState::Pending,
            },
        );
        Ok(())
    }

    /// Releases a pending claim after a failed creation.
    fn abandon(&self, origin_message_id: MessageId) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records
            .get(&origin_message_id)
            .is_some_and(|record| record.state == LifecycleState::Pending)
        {
            records.remove(&origin_message_id);
        }
    }

    fn mark_created(&self, origin_message_id: MessageId, thread_id: ChannelId) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = records.get_mut(&origin_message_id) {
            if record.state == LifecycleState::Pending {
                record.thread_id = Some(thread_id);
                record.state = LifecycleState::Created;
            }
        }
    }

    /// Moves a created record to archived, adopting threads created before this
    /// process started.
    fn mark_archived(
        &self,
        origin_message_id: MessageId,
        channel_id: ChannelId,
        kind: ThreadKind,
        thread_id: ChannelId,
    ) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .entry(origin_message_id)
            .or_insert_with(|| ThreadRecord {
                origin_message_id,
                channel_id,
                kind,
                thread_id: Some(thread_id),
                state: LifecycleState::Created,
            });
        if record.state == LifecycleState::Created {
            record.thread_id = Some(thread_id);
            record.state = LifecycleState::Archived;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(ThreadHandle),
    /// The origin already produced (or is producing) a thread.
    Duplicate(ThreadRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Archived(ThreadHandle),
    AlreadyArchived,
    NoThread,
}

pub struct LifecycleController {
    config: Arc<EngineConfig>,
    transport: Arc<dyn ThreadTransport>,
    resolver: Arc<ThreadResolver>,
    known_threads: Arc<KnownThreadCache>,
    stats: Arc<dyn StatsSink>,
    appeals: Option<Arc<dyn AppealSource>>,
    ledger: ThreadLedger,
}

impl LifecycleController {
    pub fn new(
        config: Arc<EngineConfig>,
        transport: Arc<dyn ThreadTransport>,
        resolver: Arc<ThreadResolver>,
        known_threads: Arc<KnownThreadCache>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            config,
            transport,
            resolver,
            known_threads,
            stats,
            appeals: None,
            ledger: ThreadLedger::new(),
        }
    }

    pub fn with_appeal_source(mut self, appeals: Arc<dyn AppealSource>) -> Self {
        self.appeals = Some(appeals);
        self
    }

    pub fn ledger(&self) -> &ThreadLedger {
        &self.ledger
    }

    #[tracing::instrument(
        name = "thread_bot.lifecycle.open_nomination",
        skip(self, trigger),
        fields(channel_id = %trigger.channel_id, origin_message_id = %trigger.origin_message_id)
    )]
    pub async fn open_nomination_thread(
        &self,
        trigger: &CompletedTrigger,
    ) -> Result<CreateOutcome, EngineError> {
        if let Err(existing) = self.ledger.begin(
            trigger.origin_message_id,
            trigger.channel_id,
            ThreadKind::Nomination,
        ) {
            tracing::warn!(state = ?existing.state, "nomination origin already has a thread");
            return Ok(CreateOutcome::Duplicate(existing));
        }

        let request = CreateThreadRequest {
            channel_id: trigger.channel_id,
            origin_message_id: trigger.origin_message_id,
            name: format!("Nomination - {}", trigger.subject),
            auto_archive_minutes: self.config.nomination_archive_minutes,
        };
        let thread = self.create(request, ThreadKind::Nomination).await?;

        let roles = self.config.roles;
        let ping = OutboundMessage::text(roles.mention_line()).with_role_mentions(roles.all());
        self.transport.send_message(thread.id, ping).await?;
        self.stats.increment(ThreadKind::Nomination.open_counter());
        tracing::info!(thread_id = %thread.id, subject = %trigger.subject, "nomination thread opened");
        Ok(CreateOutcome::Created(thread))
    }

    #[tracing::instrument(
        name = "thread_bot.lifecycle.open_ban_appeal",
        skip(self, signal),
        fields(channel_id = %signal.channel_id, origin_message_id = %signal.message_id)
    )]
    pub async fn open_appeal_thread(
        &self,
        signal: &AppealSignal,
    ) -> Result<CreateOutcome, EngineError> {
        let Some(appeals) = self.appeals.as_ref() else {
            return Err(EngineError::MissingAppealSource);
        };
        if let Err(existing) =
            self.ledger
                .begin(signal.message_id, signal.channel_id, ThreadKind::BanAppeal)
        {
            tracing::warn!(state = ?existing.state, "appeal signal already has a thread");
            return Ok(CreateOutcome::Duplicate(existing));
        }

        tracing::info!(response_uuid = %signal.response_uuid, "fetching appeal details");
        let details = match appeals.fetch_appeal(&signal.response_uuid).await {
            Ok(details) => details,
            Err(error) => {
                self.ledger.abandon(signal.message_id);
                if matches!(error, AppealFetchError::Forbidden { .. }) {
                    let notice = OutboundMessage::text(FORMS_CREDENTIALS_INVALID_NOTICE);
                    if let Err(send_error) =
                        self.transport.send_message(signal.channel_id, notice).await
                    {
                        tracing::error!(error = %send_error, "failed to post forms credential notice");
                    }
                }
                return Err(error.into());
            }
        };

        let request = CreateThreadRequest {
            channel_id: signal.channel_id,
            origin_message_id: signal.message_id,
            name: details.thread_name(),
            auto_archive_minutes: self.config.appeal_archive_minutes,
        };
        let thread = self.create(request, ThreadKind::BanAppeal).await?;

        self.transport
            .send_message(thread.id, OutboundMessage::text(details.to_string()))
            .await?;
        self.stats.increment(ThreadKind::BanAppeal.open_counter());
        tracing::info!(thread_id = %thread.id, appealer = %details.appealer, "ban appeal thread opened");
        Ok(CreateOutcome::Created(thread))
    }

    #[tracing::instrument(
        name = "thread_bot.lifecycle.archive",
        skip(self, deletion),
        fields(channel_id = %deletion.channel_id, origin_message_id = %deletion.message_id)
    )]
    pub async fn archive_for_deletion(
        &self,
        deletion: &Deletion,
    ) -> Result<ArchiveOutcome, EngineError> {
        let recorded = self.ledger.get(deletion.message_id);
        if recorded.as_ref().is_some_and(ThreadRecord::archived) {
            tracing::debug!("origin thread already archived");
            return Ok(ArchiveOutcome::AlreadyArchived);
        }

        let resolution = match self
            .resolver
            .resolve(deletion.message_id, deletion.channel_id)
            .await
        {
            Ok(resolution) => resolution,
            Err(error) => {
                tracing::error!(error = %error, "deletion left unresolved");
                return Err(error.into());
            }
        };
        let thread = match resolution {
            Resolution::Found { thread, .. } => thread,
            Resolution::NotFound => {
                tracing::info!("deleted message has no thread");
                return Ok(ArchiveOutcome::NoThread);
            }
        };
        if thread.archived {
            return Ok(ArchiveOutcome::AlreadyArchived);
        }

        if let Err(error) = self.transport.edit_thread_archived(&thread, true).await {
            tracing::error!(thread_id = %thread.id, error = %error, "failed to archive thread");
            return Err(error.into());
        }
        self.known_threads.remove(thread.id);

        let kind = recorded
            .map(|record| record.kind)
            .unwrap_or_else(|| self.kind_for_channel(deletion.channel_id));
        self.ledger
            .mark_archived(deletion.message_id, deletion.channel_id, kind, thread.id);
        self.stats.increment(kind.archive_counter());
        tracing::info!(thread_id = %thread.id, kind = kind.as_str(), "thread archived");
        Ok(ArchiveOutcome::Archived(ThreadHandle {
            archived: true,
            ..thread
        }))
    }

    async fn create(
        &self,
        request: CreateThreadRequest,
        kind: ThreadKind,
    ) -> Result<ThreadHandle, EngineError> {
        let origin_message_id = request.origin_message_id;
        match self.transport.create_thread(request).await {
            Ok(thread) => {
                self.ledger.mark_created(origin_message_id, thread.id);
                self.known_threads.upsert(thread.clone());
                Ok(thread)
            }
            Err(error) => {
                self.ledger.abandon(origin_message_id);
                tracing::error!(kind = kind.as_str(), error = %error, "failed to create thread");
                Err(error.into())
            }
        }
    }

    fn kind_for_channel(&self, channel_id: ChannelId) -> ThreadKind {
        if self.config.channels.appeals == Some(channel_id) {
            ThreadKind::BanAppeal
        } else {
            ThreadKind::Nomination
        }
    }
}
