//! Discord REST client backing the engine's thread transport.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thread_bot_engine::{
    ChannelId, CreateThreadRequest, GuildId, MessageHandle, MessageId, OutboundMessage,
    ThreadHandle, ThreadTransport, TransportError,
};

use crate::discord_helpers::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, parse_snowflake,
    retry_delay, truncate_for_error,
};

pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Clone, Deserialize)]
struct DiscordThreadMetadata {
    #[serde(default)]
    archived: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordChannelPayload {
    id: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    thread_metadata: Option<DiscordThreadMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordMessageReference {
    #[serde(default)]
    message_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordMessagePayload {
    id: String,
    channel_id: String,
    #[serde(default)]
    message_reference: Option<DiscordMessageReference>,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordActiveThreadsPayload {
    #[serde(default)]
    threads: Vec<DiscordChannelPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A guild channel as listed by the startup check.
pub struct GuildChannelSummary {
    pub id: ChannelId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct DiscordApiClientConfig {
    pub api_base: String,
    pub bot_token: String,
    pub guild_id: GuildId,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl DiscordApiClientConfig {
    pub fn new(bot_token: impl Into<String>, guild_id: GuildId) -> Self {
        Self {
            api_base: DEFAULT_DISCORD_API_BASE.to_string(),
            bot_token: bot_token.into(),
            guild_id,
            request_timeout_ms: 10_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 250,
        }
    }
}

#[derive(Clone)]
pub struct DiscordApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    guild_id: GuildId,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl DiscordApiClient {
    pub fn new(config: DiscordApiClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("thread-bot (discord, 0.1)"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create discord api client")?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.trim().to_string(),
            guild_id: config.guild_id,
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub async fn list_guild_channels(&self) -> Result<Vec<GuildChannelSummary>, TransportError> {
        const OPERATION: &str = "list_guild_channels";
        let channels: Vec<DiscordChannelPayload> = self
            .request_json(OPERATION, || {
                self.authorized(
                    self.http
                        .get(format!("{}/guilds/{}/channels", self.api_base, self.guild_id)),
                )
            })
            .await?;
        channels
            .into_iter()
            .map(|channel| {
                Ok(GuildChannelSummary {
                    id: ChannelId(parse_snowflake(OPERATION, "id", &channel.id)?),
                    name: channel.name.unwrap_or_default(),
                })
            })
            .collect()
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header(
            reqwest::header::AUTHORIZATION,
            format!("Bot {}", self.bot_token),
        )
    }

    async fn request_json<T, F>(&self, operation: &str, mut builder: F) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            match builder().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(|error| {
                            TransportError::Decode {
                                operation: operation.to_string(),
                                message: error.to_string(),
                            }
                        });
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                        tracing::debug!(
                            operation,
                            status = status.as_u16(),
                            attempt,
                            "retrying discord request"
                        );
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }
                    return Err(TransportError::HttpStatus {
                        operation: operation.to_string(),
                        status: status.as_u16(),
                        body: truncate_for_error(&body, 800),
                    });
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(TransportError::request(operation, error.to_string()));
                }
            }
        }
    }
}

fn thread_from_payload(
    operation: &str,
    payload: DiscordChannelPayload,
) -> Result<ThreadHandle, TransportError> {
    let parent = payload
        .parent_id
        .as_deref()
        .ok_or_else(|| TransportError::MissingField {
            operation: operation.to_string(),
            field: "parent_id",
        })?;
    Ok(ThreadHandle {
        id: ChannelId(parse_snowflake(operation, "id", &payload.id)?),
        parent_id: ChannelId(parse_snowflake(operation, "parent_id", parent)?),
        name: payload.name.unwrap_or_default(),
        archived: payload
            .thread_metadata
            .map(|metadata| metadata.archived)
            .unwrap_or(false),
    })
}

fn message_payload(message: &OutboundMessage) -> Value {
    let roles = message
        .allowed_role_mentions
        .iter()
        .map(|role| role.to_string())
        .collect::<Vec<_>>();
    let mut payload = json!({
        "content": message.content,
        "allowed_mentions": { "parse": [], "roles": roles },
    });
    if let Some(embed) = &message.embed {
        let mut rendered = json!({});
        if let Some(author_name) = &embed.author_name {
            rendered["author"] = json!({ "name": author_name });
        }
        if let Some(description) = &embed.description {
            rendered["description"] = Value::String(description.clone());
        }
        payload["embeds"] = json!([rendered]);
    }
    payload
}

#[async_trait]
impl ThreadTransport for DiscordApiClient {
    async fn send_message(
        &self,
        channel_id: ChannelId,
        message: OutboundMessage,
    ) -> Result<MessageHandle, TransportError> {
        const OPERATION: &str = "send_message";
        let payload = message_payload(&message);
        let response: DiscordMessagePayload = self
            .request_json(OPERATION, || {
                self.authorized(
                    self.http
                        .post(format!("{}/channels/{}/messages", self.api_base, channel_id)),
                )
                .json(&payload)
            })
            .await?;
        Ok(MessageHandle {
            id: MessageId(parse_snowflake(OPERATION, "id", &response.id)?),
            channel_id: ChannelId(parse_snowflake(
                OPERATION,
                "channel_id",
                &response.channel_id,
            )?),
        })
    }

    async fn create_thread(
        &self,
        request: CreateThreadRequest,
    ) -> Result<ThreadHandle, TransportError> {
        const OPERATION: &str = "create_thread";
        let payload = json!({
            "name": request.name,
            "auto_archive_duration": request.auto_archive_minutes,
        });
        let response: DiscordChannelPayload = self
            .request_json(OPERATION, || {
                self.authorized(self.http.post(format!(
                    "{}/channels/{}/messages/{}/threads",
                    self.api_base, request.channel_id, request.origin_message_id
                )))
                .json(&payload)
            })
            .await?;
        thread_from_payload(OPERATION, response)
    }

    async fn edit_thread_archived(
        &self,
        thread: &ThreadHandle,
        archived: bool,
    ) -> Result<(), TransportError> {
        let payload = json!({ "archived": archived });
        let _: Value = self
            .request_json("edit_thread", || {
                self.authorized(
                    self.http
                        .patch(format!("{}/channels/{}", self.api_base, thread.id)),
                )
                .json(&payload)
            })
            .await?;
        Ok(())
    }

    async fn fetch_active_threads(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<ThreadHandle>, TransportError> {
        const OPERATION: &str = "fetch_active_threads";
        let response: DiscordActiveThreadsPayload = self
            .request_json(OPERATION, || {
                self.authorized(self.http.get(format!(
                    "{}/guilds/{}/threads/active",
                    self.api_base, self.guild_id
                )))
            })
            .await?;
        let mut threads = Vec::new();
        for payload in response.threads {
            let thread = thread_from_payload(OPERATION, payload)?;
            if thread.parent_id == channel_id {
                threads.push(thread);
            }
        }
        Ok(threads)
    }

    async fn thread_origin(
        &self,
        thread: &ThreadHandle,
    ) -> Result<Option<MessageId>, TransportError> {
        const OPERATION: &str = "thread_origin";
        let messages: Vec<DiscordMessagePayload> = self
            .request_json(OPERATION, || {
                self.authorized(
                    self.http
                        .get(format!("{}/channels/{}/messages", self.api_base, thread.id))
                        .query(&[("after", "0"), ("limit", "1")]),
                )
            })
            .await?;
        let reference = messages
            .into_iter()
            .next()
            .and_then(|message| message.message_reference)
            .and_then(|reference| reference.message_id);
        reference
            .map(|raw| parse_snowflake(OPERATION, "message_reference.message_id", &raw).map(MessageId))
            .transpose()
    }
}
