//! Transient, read-mostly views populated by the transport's event delivery.
//!
//! Neither cache is authoritative. Readers always work on a snapshot so a
//! concurrent writer can never invalidate an in-progress scan.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use crate::ids::{ChannelId, MessageId};
use crate::transport::ThreadHandle;

pub const DEFAULT_RECENT_MESSAGE_CAPACITY: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub reference: Option<MessageId>,
    /// Parent channel when `channel_id` is a thread.
    pub thread_parent: Option<ChannelId>,
}

impl CachedMessage {
    pub fn in_thread(&self) -> bool {
        self.thread_parent.is_some()
    }
}

#[derive(Debug)]
/// Bounded, insertion-ordered buffer of recently observed messages.
pub struct RecentMessageCache {
    capacity: usize,
    messages: RwLock<VecDeque<CachedMessage>>,
}

impl Default for RecentMessageCache {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_MESSAGE_CAPACITY)
    }
}

impl RecentMessageCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            messages: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, message: CachedMessage) {
        let mut messages = self
            .messages
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        messages.push_back(message);
        while messages.len() > self.capacity {
            messages.pop_front();
        }
    }

    /// Drops a deleted message so it is not matched again.
    pub fn forget(&self, message_id: MessageId) {
        let mut messages = self
            .messages
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        messages.retain(|message| message.id != message_id);
    }

    pub fn len(&self) -> usize {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stable copy in insertion order, oldest first.
    pub fn snapshot(&self) -> Vec<CachedMessage> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
/// Threads known to be open, grouped by parent channel.
pub struct KnownThreadCache {
    threads: RwLock<HashMap<ChannelId, Vec<ThreadHandle>>>,
}

impl KnownThreadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, thread: ThreadHandle) {
        let mut threads = self.threads.write().unwrap_or_else(PoisonError::into_inner);
        for siblings in threads.values_mut() {
            siblings.retain(|known| known.id != thread.id);
        }
        if thread.archived {
            return;
        }
        threads.entry(thread.parent_id).or_default().push(thread);
    }

    pub fn remove(&self, thread_id: ChannelId) {
        let mut threads = self.threads.write().unwrap_or_else(PoisonError::into_inner);
        for siblings in threads.values_mut() {
            siblings.retain(|known| known.id != thread_id);
        }
        threads.retain(|_, siblings| !siblings.is_empty());
    }

    pub fn parent_of(&self, thread_id: ChannelId) -> Option<ChannelId> {
        self.threads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(_, siblings)| siblings.iter().any(|known| known.id == thread_id))
            .map(|(parent, _)| *parent)
    }

    /// Snapshot of the open threads under `parent_id`.
    pub fn open_threads(&self, parent_id: ChannelId) -> Vec<ThreadHandle> {
        self.threads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&parent_id)
            .cloned()
            .unwrap_or_default()
    }
}
