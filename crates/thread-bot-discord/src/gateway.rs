//! Gateway ingress: feeds serenity events into the engine caches and the
//! per-channel dispatcher, and runs the one-time startup tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serenity::all::{
    ChannelId as GatewayChannelId, Client, Context, EventHandler, GatewayIntents,
    GuildChannel, GuildId as GatewayGuildId, Message, MessageId as GatewayMessageId,
    PartialGuildChannel, Ready,
};
use thread_bot_engine::{
    CachedMessage, ChannelDispatcher, ChannelId, ChatEvent, EmbedSummary, InboundMessage,
    MessageDeletion, MessageId, OutboundEmbed, OutboundMessage, ThreadHandle, ThreadTransport,
    TransportError, UserId,
};

use crate::discord_api_client::DiscordApiClient;

pub const CONNECTED_NOTICE: &str = "Connected!";

/// Transport-neutral half of the gateway handler.
#[derive(Clone)]
pub struct GatewayBridge {
    dispatcher: Arc<ChannelDispatcher>,
}

impl GatewayBridge {
    pub fn new(dispatcher: Arc<ChannelDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<ChannelDispatcher> {
        &self.dispatcher
    }

    /// Records the message in the recent cache, then queues it for its channel.
    pub fn observe_message(&self, message: InboundMessage) {
        let engine = self.dispatcher.engine();
        let thread_parent = engine.known_threads().parent_of(message.channel_id);
        engine.recent_messages().record(CachedMessage {
            id: message.id,
            channel_id: message.channel_id,
            reference: message.reference,
            thread_parent,
        });
        self.dispatch(ChatEvent::Message(message));
    }

    pub fn observe_deletion(&self, deletion: MessageDeletion) {
        self.dispatcher
            .engine()
            .recent_messages()
            .forget(deletion.message_id);
        self.dispatch(ChatEvent::MessageDeleted(deletion));
    }

    /// Archived threads are dropped from the known-thread cache.
    pub fn observe_thread(&self, thread: ThreadHandle) {
        tracing::debug!(
            thread_id = %thread.id,
            parent_id = %thread.parent_id,
            archived = thread.archived,
            "thread observed"
        );
        self.dispatcher.engine().known_threads().upsert(thread);
    }

    pub fn forget_thread(&self, thread_id: ChannelId) {
        tracing::debug!(thread_id = %thread_id, "thread deleted");
        self.dispatcher.engine().known_threads().remove(thread_id);
    }

    /// Only watched channels reach a channel worker.
    fn dispatch(&self, event: ChatEvent) {
        let channel_id = event.channel_id();
        if !self
            .dispatcher
            .engine()
            .classifier()
            .channels()
            .is_watched(channel_id)
        {
            return;
        }
        if let Err(error) = self.dispatcher.dispatch(event) {
            tracing::warn!(channel_id = %channel_id, error = %error, "dropping chat event");
        }
    }
}

/// Work performed once the gateway session is ready.
pub struct StartupTasks {
    rest: Arc<DiscordApiClient>,
    expected_channels: Vec<(String, ChannelId)>,
    dev_log: Option<ChannelId>,
    debug_mode: bool,
    completed: AtomicBool,
}

impl StartupTasks {
    pub fn new(
        rest: Arc<DiscordApiClient>,
        expected_channels: Vec<(String, ChannelId)>,
        dev_log: Option<ChannelId>,
        debug_mode: bool,
    ) -> Self {
        Self {
            rest,
            expected_channels,
            dev_log,
            debug_mode,
            completed: AtomicBool::new(false),
        }
    }

    /// Runs the channel check and the dev-log notice. Reconnects do not repeat it.
    pub async fn run(&self, bot_name: &str) {
        if self.completed.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.debug_mode {
            match missing_channels(&self.rest, &self.expected_channels).await {
                Ok(missing) => {
                    for (name, channel_id) in missing {
                        tracing::error!(
                            channel = %name,
                            channel_id = %channel_id,
                            "configured channel does not exist in guild"
                        );
                    }
                }
                Err(error) => {
                    tracing::error!(error = %error, "failed to list guild channels");
                }
            }
        }
        if let Some(dev_log) = self.dev_log {
            if let Err(error) = post_connected_notice(self.rest.as_ref(), dev_log, bot_name).await {
                tracing::error!(channel_id = %dev_log, error = %error, "failed to post connected notice");
            }
        }
    }
}

/// Configured channels absent from the guild's channel list.
pub async fn missing_channels(
    rest: &DiscordApiClient,
    expected: &[(String, ChannelId)],
) -> Result<Vec<(String, ChannelId)>, TransportError> {
    let existing = rest.list_guild_channels().await?;
    Ok(expected
        .iter()
        .filter(|(_, channel_id)| !existing.iter().any(|channel| channel.id == *channel_id))
        .cloned()
        .collect())
}

pub async fn post_connected_notice(
    transport: &dyn ThreadTransport,
    dev_log: ChannelId,
    bot_name: &str,
) -> Result<(), TransportError> {
    let notice = OutboundMessage::text("").with_embed(OutboundEmbed {
        author_name: Some(bot_name.to_string()),
        description: Some(CONNECTED_NOTICE.to_string()),
    });
    transport.send_message(dev_log, notice).await?;
    Ok(())
}

pub struct DiscordEventHandler {
    bridge: GatewayBridge,
    startup: StartupTasks,
}

impl DiscordEventHandler {
    pub fn new(bridge: GatewayBridge, startup: StartupTasks) -> Self {
        Self { bridge, startup }
    }
}

fn inbound_message(message: &Message) -> InboundMessage {
    InboundMessage {
        id: MessageId(message.id.get()),
        channel_id: ChannelId(message.channel_id.get()),
        author_id: UserId(message.author.id.get()),
        author_is_bot: message.author.bot,
        content: message.content.clone(),
        embeds: message
            .embeds
            .iter()
            .map(|embed| EmbedSummary {
                title: embed.title.clone(),
                url: embed.url.clone(),
            })
            .collect(),
        reference: message
            .message_reference
            .as_ref()
            .and_then(|reference| reference.message_id)
            .map(|id| MessageId(id.get())),
    }
}

fn thread_handle(channel: &GuildChannel) -> Option<ThreadHandle> {
    let parent_id = channel.parent_id?;
    Some(ThreadHandle {
        id: ChannelId(channel.id.get()),
        parent_id: ChannelId(parent_id.get()),
        name: channel.name.clone(),
        archived: channel
            .thread_metadata
            .as_ref()
            .map(|metadata| metadata.archived)
            .unwrap_or(false),
    })
}

#[serenity::async_trait]
impl EventHandler for DiscordEventHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, guilds = ready.guilds.len(), "gateway ready");
        self.startup.run(&ready.user.name).await;
    }

    async fn message(&self, _ctx: Context, message: Message) {
        self.bridge.observe_message(inbound_message(&message));
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: GatewayChannelId,
        deleted_message_id: GatewayMessageId,
        _guild_id: Option<GatewayGuildId>,
    ) {
        self.bridge.observe_deletion(MessageDeletion {
            message_id: MessageId(deleted_message_id.get()),
            channel_id: ChannelId(channel_id.get()),
        });
    }

    async fn thread_create(&self, _ctx: Context, thread: GuildChannel) {
        if let Some(handle) = thread_handle(&thread) {
            self.bridge.observe_thread(handle);
        }
    }

    async fn thread_update(&self, _ctx: Context, _old: Option<GuildChannel>, new: GuildChannel) {
        if let Some(handle) = thread_handle(&new) {
            self.bridge.observe_thread(handle);
        }
    }

    async fn thread_delete(
        &self,
        _ctx: Context,
        thread: PartialGuildChannel,
        _full_thread_data: Option<GuildChannel>,
    ) {
        self.bridge.forget_thread(ChannelId(thread.id.get()));
    }
}

/// Connects to the gateway and runs until the session ends or Ctrl-C.
pub async fn run_gateway(token: &str, handler: DiscordEventHandler) -> Result<()> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let mut client = Client::builder(token, intents)
        .event_handler(handler)
        .await
        .context("failed to build discord gateway client")?;
    let shard_manager = client.shard_manager.clone();

    tokio::select! {
        result = client.start() => result.context("discord gateway session failed"),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            shard_manager.shutdown_all().await;
            Ok(())
        }
    }
}
