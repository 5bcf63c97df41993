//! Read-only engine settings, built once at startup.

use std::time::Duration;

use crate::cache::DEFAULT_RECENT_MESSAGE_CAPACITY;
use crate::classifier::WatchedChannels;
use crate::ids::RoleId;
use crate::resolver::{
    ResolverOptions, DEFAULT_AUTHORITATIVE_FETCH_TIMEOUT_MS, DEFAULT_CHUNKED_FIND_CHUNK_SIZE,
};

pub const ARCHIVE_AFTER_DAY_MINUTES: u32 = 1_440;
pub const ARCHIVE_AFTER_WEEK_MINUTES: u32 = 10_080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Roles pinged when a nomination thread opens.
pub struct StaffRoles {
    pub mod_team: RoleId,
    pub admins: RoleId,
}

impl StaffRoles {
    pub fn all(&self) -> [RoleId; 2] {
        [self.mod_team, self.admins]
    }

    pub fn mention_line(&self) -> String {
        format!("{} {}", self.mod_team.mention(), self.admins.mention())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub channels: WatchedChannels,
    pub roles: StaffRoles,
    pub recent_message_capacity: usize,
    pub chunked_find_chunk_size: usize,
    pub authoritative_fetch_timeout: Duration,
    pub nomination_archive_minutes: u32,
    pub appeal_archive_minutes: u32,
}

impl EngineConfig {
    pub fn new(channels: WatchedChannels, roles: StaffRoles) -> Self {
        Self {
            channels,
            roles,
            recent_message_capacity: DEFAULT_RECENT_MESSAGE_CAPACITY,
            chunked_find_chunk_size: DEFAULT_CHUNKED_FIND_CHUNK_SIZE,
            authoritative_fetch_timeout: Duration::from_millis(
                DEFAULT_AUTHORITATIVE_FETCH_TIMEOUT_MS,
            ),
            nomination_archive_minutes: ARCHIVE_AFTER_DAY_MINUTES,
            appeal_archive_minutes: ARCHIVE_AFTER_WEEK_MINUTES,
        }
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            chunk_size: self.chunked_find_chunk_size,
            authoritative_timeout: self.authoritative_fetch_timeout,
        }
    }
}
