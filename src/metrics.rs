//! Nil-safe counters/histograms/gauges for hot paths.
//!
//! No component ever has to check whether metrics are "on" — every
//! component holds an `Arc<dyn Metrics>` and calls it unconditionally.
//! The default is [`TracingMetrics`], which emits a `tracing` event per
//! call; a [`NoopMetrics`] is available for benchmarks and for tests that
//! assert on call counts without a subscriber attached.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Observability sink for the hot paths named throughout spec.md §4:
/// lock grant/conflict/deadlock, session slot replay, delegation
/// grant/recall, callback failure.
pub trait Metrics: Send + Sync {
    fn counter_inc(&self, name: &'static str, value: u64);
    fn gauge_set(&self, name: &'static str, value: i64);
    fn histogram_observe(&self, name: &'static str, value_us: u64);

    fn lock_granted(&self) {
        self.counter_inc("lock_granted_total", 1);
    }
    fn lock_conflict(&self) {
        self.counter_inc("lock_conflict_total", 1);
    }
    fn lock_deadlock(&self) {
        self.counter_inc("lock_deadlock_total", 1);
    }
    fn lock_grace_denied(&self) {
        self.counter_inc("lock_grace_denied_total", 1);
    }
    fn lock_queue_full(&self) {
        self.counter_inc("lock_queue_full_total", 1);
    }
    fn callback_failed(&self) {
        self.counter_inc("callback_failed_total", 1);
    }
    fn grant_auto_released(&self) {
        self.counter_inc("grant_auto_released_total", 1);
    }
    fn slot_retry(&self) {
        self.counter_inc("slot_retry_total", 1);
    }
    fn delegation_granted(&self) {
        self.counter_inc("delegation_granted_total", 1);
    }
    fn delegation_recalled(&self) {
        self.counter_inc("delegation_recalled_total", 1);
    }
    fn oplock_break_dispatched(&self) {
        self.counter_inc("oplock_break_dispatched_total", 1);
    }
}

/// Default sink: every call becomes a `tracing` event at `trace` level.
pub struct TracingMetrics;

impl Metrics for TracingMetrics {
    fn counter_inc(&self, name: &'static str, value: u64) {
        tracing::trace!(metric = name, kind = "counter", value, "metric");
    }
    fn gauge_set(&self, name: &'static str, value: i64) {
        tracing::trace!(metric = name, kind = "gauge", value, "metric");
    }
    fn histogram_observe(&self, name: &'static str, value_us: u64) {
        tracing::trace!(metric = name, kind = "histogram", value_us, "metric");
    }
}

/// Sink that discards everything — useful where even the `tracing` event
/// construction cost is unwanted.
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn counter_inc(&self, _name: &'static str, _value: u64) {}
    fn gauge_set(&self, _name: &'static str, _value: i64) {}
    fn histogram_observe(&self, _name: &'static str, _value_us: u64) {}
}

/// In-memory sink for tests that assert on specific counters.
#[derive(Default)]
pub struct RecordingMetrics {
    counters: dashmap::DashMap<&'static str, AtomicU64>,
}

impl RecordingMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, name: &'static str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl Metrics for RecordingMetrics {
    fn counter_inc(&self, name: &'static str, value: u64) {
        self.counters
            .entry(name)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }
    fn gauge_set(&self, name: &'static str, value: i64) {
        self.counters
            .entry(name)
            .or_insert_with(|| AtomicU64::new(0))
            .store(value as u64, Ordering::Relaxed);
    }
    fn histogram_observe(&self, _name: &'static str, _value_us: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_metrics_counts_calls() {
        let m = RecordingMetrics::new();
        m.lock_granted();
        m.lock_granted();
        m.lock_conflict();
        assert_eq!(m.get("lock_granted_total"), 2);
        assert_eq!(m.get("lock_conflict_total"), 1);
        assert_eq!(m.get("lock_deadlock_total"), 0);
    }
}
