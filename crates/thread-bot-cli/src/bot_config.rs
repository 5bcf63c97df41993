//! Layered TOML configuration: `config-default.toml` overridden by an
//! optional `config.toml` in the same directory.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use thread_bot_discord::{DEFAULT_DISCORD_API_BASE, DEFAULT_FORMS_API_BASE, DEFAULT_STATSD_PORT};
use thread_bot_engine::config::{ARCHIVE_AFTER_DAY_MINUTES, ARCHIVE_AFTER_WEEK_MINUTES};
use thread_bot_engine::{ChannelId, EngineConfig, GuildId, RoleId, StaffRoles, WatchedChannels};
use toml::{Table, Value};

pub const DEFAULT_CONFIG_FILE: &str = "config-default.toml";
pub const USER_CONFIG_FILE: &str = "config.toml";
pub const REQUIRED_KEYS: &[&str] = &[
    "guild.id",
    "guild.channels.nomination_voting",
    "guild.roles.mod_team",
    "guild.roles.admins",
];
const DEBUG_STATSD_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BotSection {
    pub name: String,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            name: "Thread Bot".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StatsSection {
    pub statsd_host: String,
    pub statsd_port: u16,
    pub prefix: String,
}

impl Default for StatsSection {
    fn default() -> Self {
        Self {
            statsd_host: "localhost".to_string(),
            statsd_port: DEFAULT_STATSD_PORT,
            prefix: thread_bot_discord::DEFAULT_STATSD_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelsSection {
    pub nomination_voting: ChannelId,
    #[serde(default)]
    pub appeals: Option<ChannelId>,
    #[serde(default)]
    pub dev_log: Option<ChannelId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RolesSection {
    pub mod_team: RoleId,
    pub admins: RoleId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GuildSection {
    pub id: GuildId,
    pub channels: ChannelsSection,
    pub roles: RolesSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UrlsSection {
    pub discord_api: String,
    pub forms_api: String,
}

impl Default for UrlsSection {
    fn default() -> Self {
        Self {
            discord_api: DEFAULT_DISCORD_API_BASE.to_string(),
            forms_api: DEFAULT_FORMS_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub recent_message_capacity: usize,
    pub chunked_find_chunk_size: usize,
    pub authoritative_fetch_timeout_ms: u64,
    pub nomination_archive_minutes: u32,
    pub appeal_archive_minutes: u32,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            recent_message_capacity: thread_bot_engine::cache::DEFAULT_RECENT_MESSAGE_CAPACITY,
            chunked_find_chunk_size: thread_bot_engine::resolver::DEFAULT_CHUNKED_FIND_CHUNK_SIZE,
            authoritative_fetch_timeout_ms:
                thread_bot_engine::resolver::DEFAULT_AUTHORITATIVE_FETCH_TIMEOUT_MS,
            nomination_archive_minutes: ARCHIVE_AFTER_DAY_MINUTES,
            appeal_archive_minutes: ARCHIVE_AFTER_WEEK_MINUTES,
            request_timeout_ms: 10_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub bot: BotSection,
    #[serde(default)]
    pub stats: StatsSection,
    pub guild: GuildSection,
    #[serde(default)]
    pub urls: UrlsSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(skip)]
    pub debug_mode: bool,
}

impl BotConfig {
    pub fn load(config_dir: &Path, debug_mode: bool) -> Result<Self> {
        let defaults_path = config_dir.join(DEFAULT_CONFIG_FILE);
        let mut merged = read_table(&defaults_path)?;
        let user_path = config_dir.join(USER_CONFIG_FILE);
        if user_path.is_file() {
            tracing::info!(path = %user_path.display(), "found user config, applying overrides");
            merge_tables(&mut merged, read_table(&user_path)?);
        }
        Self::from_table(merged, debug_mode)
    }

    pub fn from_table(table: Table, debug_mode: bool) -> Result<Self> {
        check_required_keys(&table, REQUIRED_KEYS)?;
        let mut config = Value::Table(table)
            .try_into::<BotConfig>()
            .context("failed to parse bot configuration")?;
        if config.engine.recent_message_capacity == 0 {
            bail!("engine.recent_message_capacity must be greater than 0");
        }
        if debug_mode {
            config.apply_debug_mode();
        }
        Ok(config)
    }

    fn apply_debug_mode(&mut self) {
        self.debug_mode = true;
        self.engine.appeal_archive_minutes = ARCHIVE_AFTER_DAY_MINUTES;
        self.stats.statsd_host = DEBUG_STATSD_HOST.to_string();
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(
            WatchedChannels {
                nomination_voting: self.guild.channels.nomination_voting,
                appeals: self.guild.channels.appeals,
            },
            StaffRoles {
                mod_team: self.guild.roles.mod_team,
                admins: self.guild.roles.admins,
            },
        );
        config.recent_message_capacity = self.engine.recent_message_capacity;
        config.chunked_find_chunk_size = self.engine.chunked_find_chunk_size;
        config.authoritative_fetch_timeout =
            Duration::from_millis(self.engine.authoritative_fetch_timeout_ms);
        config.nomination_archive_minutes = self.engine.nomination_archive_minutes;
        config.appeal_archive_minutes = self.engine.appeal_archive_minutes;
        config
    }

    /// Configured channels, keyed by their config name, for the startup check.
    pub fn expected_channels(&self) -> Vec<(String, ChannelId)> {
        let channels = &self.guild.channels;
        let mut expected = vec![("nomination_voting".to_string(), channels.nomination_voting)];
        if let Some(appeals) = channels.appeals {
            expected.push(("appeals".to_string(), appeals));
        }
        if let Some(dev_log) = channels.dev_log {
            expected.push(("dev_log".to_string(), dev_log));
        }
        expected
    }
}

fn read_table(path: &Path) -> Result<Table> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str::<Table>(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Nested tables merge key by key; any other value replaces the base.
pub fn merge_tables(base: &mut Table, overrides: Table) {
    for (key, value) in overrides {
        match value {
            Value::Table(incoming) => {
                if let Some(Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, incoming);
                    continue;
                }
                base.insert(key, Value::Table(incoming));
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

pub fn check_required_keys(table: &Table, keys: &[&str]) -> Result<()> {
    for key_path in keys {
        let mut segments = key_path.split('.');
        let mut current = segments.next().and_then(|first| table.get(first));
        for segment in segments {
            current = match current {
                Some(Value::Table(inner)) => inner.get(segment),
                _ => None,
            };
        }
        if current.is_none() {
            bail!(
                "a configuration for `{key_path}` is required, but was not found; set it in {USER_CONFIG_FILE}"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
