//! Explicit table from classification kind to handler, built at startup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::aggregator::TriggerAggregator;
use crate::classifier::{Classification, ClassificationKind};
use crate::error::EngineError;
use crate::lifecycle::LifecycleController;
use crate::stats::StatsSink;

#[async_trait]
pub trait ClassifiedEventHandler: Send + Sync {
    async fn handle(&self, classification: Classification) -> Result<(), EngineError>;
}

/// Feeds vote fragments through the aggregator and opens a thread on completion.
pub struct VoteFragmentHandler {
    aggregator: Mutex<TriggerAggregator>,
    lifecycle: Arc<LifecycleController>,
    stats: Arc<dyn StatsSink>,
}

impl VoteFragmentHandler {
    pub fn new(lifecycle: Arc<LifecycleController>, stats: Arc<dyn StatsSink>) -> Self {
        Self {
            aggregator: Mutex::new(TriggerAggregator::new()),
            lifecycle,
            stats,
        }
    }
}

#[async_trait]
impl ClassifiedEventHandler for VoteFragmentHandler {
    async fn handle(&self, classification: Classification) -> Result<(), EngineError> {
        let Classification::VoteFragment(fragment) = classification else {
            return Ok(());
        };
        // The lock is released before any transport call.
        let (completed, anomalies) = {
            let mut aggregator = self
                .aggregator
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let completed = aggregator.feed(&fragment);
            (completed, aggregator.take_anomalies())
        };
        for anomaly in &anomalies {
            self.stats.increment(anomaly.counter_name());
        }
        if let Some(trigger) = completed {
            self.lifecycle.open_nomination_thread(&trigger).await?;
        }
        Ok(())
    }
}

pub struct AppealSignalHandler {
    lifecycle: Arc<LifecycleController>,
}

impl AppealSignalHandler {
    pub fn new(lifecycle: Arc<LifecycleController>) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl ClassifiedEventHandler for AppealSignalHandler {
    async fn handle(&self, classification: Classification) -> Result<(), EngineError> {
        let Classification::AppealSignal(signal) = classification else {
            return Ok(());
        };
        self.lifecycle.open_appeal_thread(&signal).await?;
        Ok(())
    }
}

pub struct DeletionHandler {
    lifecycle: Arc<LifecycleController>,
}

impl DeletionHandler {
    pub fn new(lifecycle: Arc<LifecycleController>) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl ClassifiedEventHandler for DeletionHandler {
    async fn handle(&self, classification: Classification) -> Result<(), EngineError> {
        let Classification::Deletion(deletion) = classification else {
            return Ok(());
        };
        self.lifecycle.archive_for_deletion(&deletion).await?;
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<ClassificationKind, Arc<dyn ClassifiedEventHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires the nomination, appeal and deletion handlers to one controller.
    pub fn standard(lifecycle: Arc<LifecycleController>, stats: Arc<dyn StatsSink>) -> Self {
        let mut table = Self::new();
        table.register(
            ClassificationKind::VoteFragment,
            Arc::new(VoteFragmentHandler::new(lifecycle.clone(), stats)),
        );
        table.register(
            ClassificationKind::AppealSignal,
            Arc::new(AppealSignalHandler::new(lifecycle.clone())),
        );
        table.register(
            ClassificationKind::Deletion,
            Arc::new(DeletionHandler::new(lifecycle)),
        );
        table
    }

    pub fn register(
        &mut self,
        kind: ClassificationKind,
        handler: Arc<dyn ClassifiedEventHandler>,
    ) -> Option<Arc<dyn ClassifiedEventHandler>> {
        self.handlers.insert(kind, handler)
    }

    pub fn handler_for(&self, kind: ClassificationKind) -> Option<Arc<dyn ClassifiedEventHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ClassificationKind> {
        let mut kinds = self.handlers.keys().copied().collect::<Vec<_>>();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }
}
