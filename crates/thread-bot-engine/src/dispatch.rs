//! Per-channel sequential workers.
//!
//! Each channel gets one worker task, spawned on its first event. Events of a
//! channel are handled strictly in arrival order; different channels run
//! concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::engine::Engine;
use crate::event::ChatEvent;
use crate::ids::ChannelId;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher is shutting down")]
    ShuttingDown,
    #[error("worker for channel {0} stopped unexpectedly")]
    WorkerClosed(ChannelId),
}

struct WorkerHandle {
    tx: mpsc::UnboundedSender<ChatEvent>,
    task: JoinHandle<()>,
}

pub struct ChannelDispatcher {
    engine: Arc<Engine>,
    workers: Mutex<HashMap<ChannelId, WorkerHandle>>,
    shutdown_tx: watch::Sender<bool>,
}

impl ChannelDispatcher {
    pub fn new(engine: Arc<Engine>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            engine,
            workers: Mutex::new(HashMap::new()),
            shutdown_tx,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn worker_count(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Queues `event` on its channel's worker, spawning the worker if needed.
    pub fn dispatch(&self, event: ChatEvent) -> Result<(), DispatchError> {
        if *self.shutdown_tx.borrow() {
            return Err(DispatchError::ShuttingDown);
        }
        let channel_id = event.channel_id();
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if workers
            .get(&channel_id)
            .is_some_and(|worker| worker.tx.is_closed())
        {
            tracing::warn!(channel_id = %channel_id, "replacing stopped channel worker");
            workers.remove(&channel_id);
        }
        let worker = workers
            .entry(channel_id)
            .or_insert_with(|| self.spawn_worker(channel_id));
        worker
            .tx
            .send(event)
            .map_err(|_| DispatchError::WorkerClosed(channel_id))
    }

    /// Signals every worker to stop and waits for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let workers = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain().collect::<Vec<_>>()
        };
        for (channel_id, worker) in workers {
            drop(worker.tx);
            if let Err(error) = worker.task.await {
                tracing::error!(channel_id = %channel_id, error = %error, "channel worker panicked");
            }
        }
    }

    fn spawn_worker(&self, channel_id: ChannelId) -> WorkerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = self.engine.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        tracing::debug!(channel_id = %channel_id, "spawning channel worker");
        let task = tokio::spawn(run_channel_worker(channel_id, engine, rx, shutdown_rx));
        WorkerHandle { tx, task }
    }
}

async fn run_channel_worker(
    channel_id: ChannelId,
    engine: Arc<Engine>,
    mut rx: mpsc::UnboundedReceiver<ChatEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else {
                    break;
                };
                let event_kind = event.as_str();
                if let Err(error) = engine.handle_event(event).await {
                    tracing::error!(
                        channel_id = %channel_id,
                        event = event_kind,
                        error = %error,
                        "failed to handle chat event"
                    );
                }
            }
        }
    }
    tracing::debug!(channel_id = %channel_id, "channel worker stopped");
}
