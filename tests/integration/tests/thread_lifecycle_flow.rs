use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use thread_bot_engine::{
    AppealDetails, AppealFetchError, AppealSource, ArchiveOutcome, ChannelDispatcher, ChannelId,
    ChatEvent, ClassificationKind, CreateThreadRequest, EmbedSummary, Engine, EngineConfig,
    InMemoryStats, InboundMessage, MessageDeletion, MessageHandle, MessageId, OutboundMessage,
    RoleId, StaffRoles, ThreadHandle, ThreadTransport, TransportError, UserId, WatchedChannels,
};
use tokio::sync::Mutex as AsyncMutex;

const VOTING: ChannelId = ChannelId(822853512709931008);
const APPEALS: ChannelId = ChannelId(890331800025563216);
const BOT: UserId = UserId(1);
const OPENER: &str = "<@123> (Alice#0001) for Helper!\n\n**Nominated by:** <@456>";
const CLOSER: &str = "*Please react :+1: for approval, or :-1: for disapproval*.";

#[derive(Default)]
struct RecordingTransport {
    threads: AsyncMutex<Vec<ThreadHandle>>,
    origins: AsyncMutex<HashMap<ChannelId, MessageId>>,
    sent: AsyncMutex<Vec<(ChannelId, OutboundMessage)>>,
    archived: AsyncMutex<Vec<ChannelId>>,
    next_id: AtomicU64,
    active_fetches: AtomicUsize,
}

impl RecordingTransport {
    async fn seed_thread(&self, thread: ThreadHandle, origin: MessageId) {
        self.origins.lock().await.insert(thread.id, origin);
        self.threads.lock().await.push(thread);
    }

    async fn created_names(&self) -> Vec<String> {
        self.threads
            .lock()
            .await
            .iter()
            .map(|thread| thread.name.clone())
            .collect()
    }
}

#[async_trait]
impl ThreadTransport for RecordingTransport {
    async fn send_message(
        &self,
        channel_id: ChannelId,
        message: OutboundMessage,
    ) -> Result<MessageHandle, TransportError> {
        self.sent.lock().await.push((channel_id, message));
        Ok(MessageHandle {
            id: MessageId(5_000 + self.next_id.fetch_add(1, Ordering::SeqCst)),
            channel_id,
        })
    }

    async fn create_thread(
        &self,
        request: CreateThreadRequest,
    ) -> Result<ThreadHandle, TransportError> {
        let thread = ThreadHandle {
            id: ChannelId(9_000 + self.next_id.fetch_add(1, Ordering::SeqCst)),
            parent_id: request.channel_id,
            name: request.name,
            archived: false,
        };
        self.seed_thread(thread.clone(), request.origin_message_id)
            .await;
        Ok(thread)
    }

    async fn edit_thread_archived(
        &self,
        thread: &ThreadHandle,
        archived: bool,
    ) -> Result<(), TransportError> {
        let mut threads = self.threads.lock().await;
        if let Some(existing) = threads.iter_mut().find(|existing| existing.id == thread.id) {
            existing.archived = archived;
        }
        self.archived.lock().await.push(thread.id);
        Ok(())
    }

    async fn fetch_active_threads(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<ThreadHandle>, TransportError> {
        self.active_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .threads
            .lock()
            .await
            .iter()
            .filter(|thread| thread.parent_id == channel_id && !thread.archived)
            .cloned()
            .collect())
    }

    async fn thread_origin(
        &self,
        thread: &ThreadHandle,
    ) -> Result<Option<MessageId>, TransportError> {
        Ok(self.origins.lock().await.get(&thread.id).copied())
    }
}

struct FixedAppeal;

#[async_trait]
impl AppealSource for FixedAppeal {
    async fn fetch_appeal(&self, response_uuid: &str) -> Result<AppealDetails, AppealFetchError> {
        Ok(AppealDetails {
            appealer: "spammer#1234".to_string(),
            uuid: response_uuid.to_string(),
            email: "spammer@example.com".to_string(),
            reason: "Posting links".to_string(),
            justification: "It was a compromised account".to_string(),
        })
    }
}

fn config() -> EngineConfig {
    EngineConfig::new(
        WatchedChannels {
            nomination_voting: VOTING,
            appeals: Some(APPEALS),
        },
        StaffRoles {
            mod_team: RoleId(267629731250176001),
            admins: RoleId(267628507062992896),
        },
    )
}

fn engine(transport: Arc<RecordingTransport>, stats: Arc<InMemoryStats>) -> Engine {
    Engine::new(config(), transport, stats, Some(Arc::new(FixedAppeal)))
}

fn bot_message(id: u64, channel_id: ChannelId, content: &str) -> ChatEvent {
    ChatEvent::Message(InboundMessage {
        id: MessageId(id),
        channel_id,
        author_id: BOT,
        author_is_bot: true,
        content: content.to_string(),
        embeds: Vec::new(),
        reference: None,
    })
}

fn deletion(id: u64, channel_id: ChannelId) -> ChatEvent {
    ChatEvent::MessageDeleted(MessageDeletion {
        message_id: MessageId(id),
        channel_id,
    })
}

#[tokio::test]
async fn integration_split_nomination_opens_thread_and_deletion_archives_it() {
    let transport = Arc::new(RecordingTransport::default());
    let stats = Arc::new(InMemoryStats::new());
    let engine = engine(transport.clone(), stats.clone());

    for (id, text) in [(1, OPENER), (2, "**Strengths:** helpful"), (3, CLOSER)] {
        engine
            .handle_event(bot_message(id, VOTING, text))
            .await
            .expect("vote fragment");
    }
    assert_eq!(transport.created_names().await, vec!["Nomination - Alice"]);
    let sent = transport.sent.lock().await.clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.content, "<@&267629731250176001> <@&267628507062992896>");
    assert_eq!(stats.count("thread.nomination.open"), 1);

    let acted = engine
        .handle_event(deletion(3, VOTING))
        .await
        .expect("deletion");
    assert_eq!(acted, Some(ClassificationKind::Deletion));
    assert_eq!(transport.archived.lock().await.len(), 1);
    assert_eq!(stats.count("thread.nomination.archive"), 1);

    let outcome = engine
        .lifecycle()
        .archive_for_deletion(&thread_bot_engine::classifier::Deletion {
            message_id: MessageId(3),
            channel_id: VOTING,
        })
        .await
        .expect("second archive");
    assert_eq!(outcome, ArchiveOutcome::AlreadyArchived);
    assert_eq!(transport.archived.lock().await.len(), 1);
    assert_eq!(stats.count("thread.nomination.archive"), 1);
}

#[tokio::test]
async fn integration_deletion_after_restart_falls_back_to_active_thread_fetch() {
    let transport = Arc::new(RecordingTransport::default());
    transport
        .seed_thread(
            ThreadHandle {
                id: ChannelId(77),
                parent_id: VOTING,
                name: "Nomination - Bob".to_string(),
                archived: false,
            },
            MessageId(40),
        )
        .await;
    let stats = Arc::new(InMemoryStats::new());
    let engine = engine(transport.clone(), stats.clone());

    engine
        .handle_event(deletion(40, VOTING))
        .await
        .expect("deletion");
    assert_eq!(transport.active_fetches.load(Ordering::SeqCst), 1);
    assert_eq!(*transport.archived.lock().await, vec![ChannelId(77)]);
    assert_eq!(stats.count("thread.nomination.archive"), 1);

    engine
        .handle_event(deletion(41, VOTING))
        .await
        .expect("unrelated deletion");
    assert_eq!(transport.archived.lock().await.len(), 1);
}

#[tokio::test]
async fn integration_appeal_signal_opens_thread_with_summary() {
    let transport = Arc::new(RecordingTransport::default());
    let stats = Arc::new(InMemoryStats::new());
    let engine = engine(transport.clone(), stats.clone());

    let signal = ChatEvent::Message(InboundMessage {
        id: MessageId(60),
        channel_id: APPEALS,
        author_id: BOT,
        author_is_bot: true,
        content: String::new(),
        embeds: vec![EmbedSummary {
            title: Some("New ban appeal".to_string()),
            url: Some(
                "https://forms.pythondiscord.com/ban-appeals/7fbb1a2e-d910-44bb-bcc7-e9fcfd04f758/"
                    .to_string(),
            ),
        }],
        reference: None,
    });
    let acted = engine.handle_event(signal).await.expect("appeal signal");
    assert_eq!(acted, Some(ClassificationKind::AppealSignal));
    assert_eq!(
        transport.created_names().await,
        vec!["Ban appeal - spammer#1234"]
    );
    let sent = transport.sent.lock().await.clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0]
        .1
        .content
        .starts_with("7fbb1a2e-d910-44bb-bcc7-e9fcfd04f758 - spammer#1234\n\n"));
    assert_eq!(stats.count("thread.ban_appeal.open"), 1);

    engine
        .handle_event(deletion(60, APPEALS))
        .await
        .expect("deletion");
    assert_eq!(stats.count("thread.ban_appeal.archive"), 1);
}

#[tokio::test]
async fn integration_dispatcher_handles_channels_independently() {
    let transport = Arc::new(RecordingTransport::default());
    let stats = Arc::new(InMemoryStats::new());
    let dispatcher = ChannelDispatcher::new(Arc::new(engine(transport.clone(), stats.clone())));

    dispatcher
        .dispatch(bot_message(1, VOTING, OPENER))
        .expect("dispatch opener");
    dispatcher
        .dispatch(bot_message(2, ChannelId(999), CLOSER))
        .expect("dispatch unwatched");
    dispatcher
        .dispatch(bot_message(3, VOTING, CLOSER))
        .expect("dispatch closer");

    tokio::time::timeout(Duration::from_secs(5), async {
        while stats.count("thread.nomination.open") == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("thread opened");
    assert_eq!(transport.created_names().await, vec!["Nomination - Alice"]);
    assert_eq!(dispatcher.worker_count(), 2);

    dispatcher.shutdown().await;
    assert!(dispatcher.dispatch(bot_message(4, VOTING, OPENER)).is_err());
}
