//! Fire-and-forget counter sinks.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Trait contract for counter emission; implementations must never block.
pub trait StatsSink: Send + Sync {
    fn increment(&self, name: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn increment(&self, _name: &str) {}
}

#[derive(Debug, Default)]
/// Keeps counters in memory; used by tests and local debugging.
pub struct InMemoryStats {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl InMemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatsSink for InMemoryStats {
    fn increment(&self, name: &str) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = counters.entry(name.to_string()).or_insert(0);
        *counter = counter.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryStats, StatsSink};

    #[test]
    fn unit_in_memory_stats_counts_per_name() {
        let stats = InMemoryStats::new();
        stats.increment("thread.nomination.open");
        stats.increment("thread.nomination.open");
        stats.increment("thread.ban_appeal.open");
        assert_eq!(stats.count("thread.nomination.open"), 2);
        assert_eq!(stats.count("thread.ban_appeal.open"), 1);
        assert_eq!(stats.count("missing"), 0);
        assert_eq!(stats.snapshot().len(), 2);
    }
}
