use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::ids::{ChannelId, MessageId};
use crate::transport::{
    CreateThreadRequest, MessageHandle, OutboundMessage, ThreadHandle, ThreadTransport,
    TransportError,
};

/// Scriptable in-memory transport recording every call.
#[derive(Default)]
pub struct FakeTransport {
    pub active_threads: Mutex<Vec<ThreadHandle>>,
    pub origins: Mutex<HashMap<ChannelId, MessageId>>,
    pub failing_origins: Mutex<Vec<ChannelId>>,
    pub fail_active_fetch: Mutex<bool>,
    pub fail_create_thread: Mutex<bool>,
    pub fail_archive: Mutex<bool>,
    pub active_fetch_delay: Mutex<Option<Duration>>,
    pub sent: Mutex<Vec<(ChannelId, OutboundMessage)>>,
    pub created: Mutex<Vec<CreateThreadRequest>>,
    pub archived: Mutex<Vec<ChannelId>>,
    pub active_fetch_calls: AtomicUsize,
    pub origin_calls: AtomicUsize,
    next_id: AtomicU64,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(9_000),
            ..Self::default()
        }
    }

    /// Registers an active thread started from `origin`.
    pub fn with_thread(self, thread: ThreadHandle, origin: MessageId) -> Self {
        self.origins
            .lock()
            .expect("origins lock")
            .insert(thread.id, origin);
        self.active_threads
            .lock()
            .expect("threads lock")
            .push(thread);
        self
    }

    pub fn sent_contents(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("sent lock")
            .iter()
            .map(|(_, message)| message.content.clone())
            .collect()
    }

    pub fn archived_ids(&self) -> Vec<ChannelId> {
        self.archived.lock().expect("archived lock").clone()
    }

    pub fn created_requests(&self) -> Vec<CreateThreadRequest> {
        self.created.lock().expect("created lock").clone()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

pub fn thread(id: u64, parent: u64) -> ThreadHandle {
    ThreadHandle {
        id: ChannelId(id),
        parent_id: ChannelId(parent),
        name: format!("thread-{id}"),
        archived: false,
    }
}

#[async_trait]
impl ThreadTransport for FakeTransport {
    async fn send_message(
        &self,
        channel_id: ChannelId,
        message: OutboundMessage,
    ) -> Result<MessageHandle, TransportError> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((channel_id, message));
        Ok(MessageHandle {
            id: MessageId(self.next_id()),
            channel_id,
        })
    }

    async fn create_thread(
        &self,
        request: CreateThreadRequest,
    ) -> Result<ThreadHandle, TransportError> {
        if *self.fail_create_thread.lock().expect("flag lock") {
            return Err(TransportError::HttpStatus {
                operation: "create_thread".to_string(),
                status: 403,
                body: "missing permissions".to_string(),
            });
        }
        self.created
            .lock()
            .expect("created lock")
            .push(request.clone());
        let handle = ThreadHandle {
            id: ChannelId(self.next_id()),
            parent_id: request.channel_id,
            name: request.name,
            archived: false,
        };
        self.origins
            .lock()
            .expect("origins lock")
            .insert(handle.id, request.origin_message_id);
        self.active_threads
            .lock()
            .expect("threads lock")
            .push(handle.clone());
        Ok(handle)
    }

    async fn edit_thread_archived(
        &self,
        thread: &ThreadHandle,
        archived: bool,
    ) -> Result<(), TransportError> {
        if *self.fail_archive.lock().expect("flag lock") {
            return Err(TransportError::request("edit_thread", "connection reset"));
        }
        if archived {
            self.archived.lock().expect("archived lock").push(thread.id);
            self.active_threads
                .lock()
                .expect("threads lock")
                .retain(|active| active.id != thread.id);
        }
        Ok(())
    }

    async fn fetch_active_threads(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<ThreadHandle>, TransportError> {
        self.active_fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.active_fetch_delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_active_fetch.lock().expect("flag lock") {
            return Err(TransportError::HttpStatus {
                operation: "fetch_active_threads".to_string(),
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self
            .active_threads
            .lock()
            .expect("threads lock")
            .iter()
            .filter(|thread| thread.parent_id == channel_id)
            .cloned()
            .collect())
    }

    async fn thread_origin(
        &self,
        thread: &ThreadHandle,
    ) -> Result<Option<MessageId>, TransportError> {
        self.origin_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_origins
            .lock()
            .expect("failing lock")
            .contains(&thread.id)
        {
            return Err(TransportError::request("thread_origin", "timed out"));
        }
        Ok(self
            .origins
            .lock()
            .expect("origins lock")
            .get(&thread.id)
            .copied())
    }
}
