//! Boot-time grace period state (spec.md §4.1).
//!
//! While active: non-reclaim `LOCK` is rejected with `GracePeriod`,
//! reclaim `LOCK` and `TEST` are permitted, and the period ends early
//! once every registered client has submitted `RECLAIM_COMPLETE`.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct GraceState {
    started_at: Instant,
    duration: Duration,
    /// `None` once the operator or the reclaim-complete condition has
    /// ended grace early.
    ended_early: Mutex<bool>,
    registered_clients: Mutex<HashSet<String>>,
    reclaimed_clients: Mutex<HashSet<String>>,
}

impl GraceState {
    pub fn new(duration: Duration) -> Self {
        Self {
            started_at: Instant::now(),
            duration,
            ended_early: Mutex::new(false),
            registered_clients: Mutex::new(HashSet::new()),
            reclaimed_clients: Mutex::new(HashSet::new()),
        }
    }

    /// Whether the grace window is currently in effect.
    pub fn is_active(&self) -> bool {
        if *self.ended_early.lock().unwrap() {
            return false;
        }
        self.started_at.elapsed() < self.duration
    }

    /// Registers a client as one whose `RECLAIM_COMPLETE` we wait for
    /// before ending grace early.
    pub fn register_client(&self, client_id: &str) {
        self.registered_clients
            .lock()
            .unwrap()
            .insert(client_id.to_string());
    }

    pub fn unregister_client(&self, client_id: &str) {
        self.registered_clients.lock().unwrap().remove(client_id);
        self.reclaimed_clients.lock().unwrap().remove(client_id);
        self.maybe_end_early();
    }

    /// Records a client's `RECLAIM_COMPLETE` and ends the grace period
    /// early if every registered client has now reclaimed.
    pub fn reclaim_complete(&self, client_id: &str) {
        self.reclaimed_clients
            .lock()
            .unwrap()
            .insert(client_id.to_string());
        self.maybe_end_early();
    }

    fn maybe_end_early(&self) {
        let registered = self.registered_clients.lock().unwrap();
        let reclaimed = self.reclaimed_clients.lock().unwrap();
        if !registered.is_empty() && registered.is_subset(&reclaimed) {
            *self.ended_early.lock().unwrap() = true;
            tracing::info!("grace period ended early: all clients reclaimed");
        }
    }

    /// `dfsctl grace end` administrative override.
    pub fn end_now(&self) {
        *self.ended_early.lock().unwrap() = true;
        tracing::info!("grace period ended by administrative override");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_immediately_after_boot() {
        let g = GraceState::new(Duration::from_secs(90));
        assert!(g.is_active());
    }

    #[test]
    fn admin_override_ends_grace() {
        let g = GraceState::new(Duration::from_secs(90));
        g.end_now();
        assert!(!g.is_active());
    }

    #[test]
    fn ends_early_once_all_clients_reclaim() {
        let g = GraceState::new(Duration::from_secs(90));
        g.register_client("c1");
        g.register_client("c2");
        assert!(g.is_active());
        g.reclaim_complete("c1");
        assert!(g.is_active());
        g.reclaim_complete("c2");
        assert!(!g.is_active());
    }

    #[test]
    fn zero_duration_grace_is_inactive_immediately() {
        let g = GraceState::new(Duration::from_secs(0));
        assert!(!g.is_active());
    }
}
