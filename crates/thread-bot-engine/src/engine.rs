use std::sync::Arc;

use crate::appeal::AppealSource;
use crate::cache::{KnownThreadCache, RecentMessageCache};
use crate::classifier::{Classification, ClassificationKind, EventClassifier};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event::ChatEvent;
use crate::handlers::HandlerTable;
use crate::lifecycle::LifecycleController;
use crate::resolver::ThreadResolver;
use crate::stats::StatsSink;
use crate::transport::ThreadTransport;

/// Classifies chat events and routes them through the handler table.
pub struct Engine {
    config: Arc<EngineConfig>,
    classifier: EventClassifier,
    handlers: HandlerTable,
    recent_messages: Arc<RecentMessageCache>,
    known_threads: Arc<KnownThreadCache>,
    lifecycle: Arc<LifecycleController>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn ThreadTransport>,
        stats: Arc<dyn StatsSink>,
        appeals: Option<Arc<dyn AppealSource>>,
    ) -> Self {
        let config = Arc::new(config);
        let recent_messages = Arc::new(RecentMessageCache::new(config.recent_message_capacity));
        let known_threads = Arc::new(KnownThreadCache::new());
        let resolver = Arc::new(ThreadResolver::new(
            recent_messages.clone(),
            known_threads.clone(),
            transport.clone(),
            config.resolver_options(),
        ));
        let mut lifecycle = LifecycleController::new(
            config.clone(),
            transport,
            resolver,
            known_threads.clone(),
            stats.clone(),
        );
        if let Some(appeals) = appeals {
            lifecycle = lifecycle.with_appeal_source(appeals);
        }
        let lifecycle = Arc::new(lifecycle);
        let handlers = HandlerTable::standard(lifecycle.clone(), stats);

        tracing::info!(
            nomination_voting = %config.channels.nomination_voting,
            appeals = ?config.channels.appeals.map(|channel| channel.get()),
            recent_message_capacity = config.recent_message_capacity,
            "thread engine ready"
        );
        Self {
            classifier: EventClassifier::new(config.channels),
            config,
            handlers,
            recent_messages,
            known_threads,
            lifecycle,
        }
    }

    /// Replaces the handler table; kinds without a handler are dropped.
    pub fn with_handlers(mut self, handlers: HandlerTable) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &EventClassifier {
        &self.classifier
    }

    pub fn recent_messages(&self) -> &Arc<RecentMessageCache> {
        &self.recent_messages
    }

    pub fn known_threads(&self) -> &Arc<KnownThreadCache> {
        &self.known_threads
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    /// Handles one event. Returns the kind that was acted on, or `None` when
    /// the event was ignored.
    pub async fn handle_event(
        &self,
        event: ChatEvent,
    ) -> Result<Option<ClassificationKind>, EngineError> {
        let classification = self.classifier.classify(&event);
        let Some(kind) = classification.kind() else {
            return Ok(None);
        };
        let Some(handler) = self.handlers.handler_for(kind) else {
            tracing::debug!(kind = kind.as_str(), "no handler registered");
            return Ok(None);
        };
        tracing::debug!(
            kind = kind.as_str(),
            event = event.as_str(),
            channel_id = %event.channel_id(),
            "dispatching classified event"
        );
        handler.handle(classification).await?;
        Ok(Some(kind))
    }

    pub fn classify(&self, event: &ChatEvent) -> Classification {
        self.classifier.classify(event)
    }
}
