//! Waits-for graph used for deadlock detection (spec.md §4.1).
//!
//! Edge `waiter -> holder` means `waiter` is blocked waiting for a range
//! `holder` currently holds. Before a blocking request is queued, the
//! manager tentatively adds its edges and runs a DFS from the waiter: if
//! the waiter can reach itself, a cycle would form and the request is
//! rejected with `WouldDeadlock` instead of being queued. The DFS touches
//! each edge at most once, so detection is `O(edges)` per check, and the
//! graph itself is bounded by the total number of blocked requests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::lock::owner::LockOwner;

#[derive(Default)]
pub struct WaitForGraph {
    edges: Mutex<HashMap<LockOwner, HashSet<LockOwner>>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tentatively registers `waiter` as blocked on each of `holders`. If
    /// doing so would close a cycle, the edges are rolled back and `true`
    /// is returned (caller must not enqueue the waiter). Otherwise the
    /// edges are committed and `false` is returned.
    pub fn try_add_waiter(&self, waiter: &LockOwner, holders: &[LockOwner]) -> bool {
        let mut edges = self.edges.lock().unwrap();
        let entry = edges.entry(waiter.clone()).or_default();
        for h in holders {
            if h != waiter {
                entry.insert(h.clone());
            }
        }
        let would_cycle = Self::reaches_via_edge(&edges, waiter, waiter);
        if would_cycle {
            // Roll back: drop the edges we just added for this waiter.
            if let Some(entry) = edges.get_mut(waiter) {
                for h in holders {
                    entry.remove(h);
                }
                if entry.is_empty() {
                    edges.remove(waiter);
                }
            }
        }
        would_cycle
    }

    /// Removes all outbound edges for `waiter` — called when the waiter
    /// is granted, cancelled, or its owner is torn down.
    pub fn remove_waiter(&self, waiter: &LockOwner) {
        self.edges.lock().unwrap().remove(waiter);
    }

    /// Whether `target` is reachable from `start` via at least one edge
    /// (i.e. excludes the trivial zero-length path from a node to itself).
    /// Visits each node at most once, so this is `O(edges)`.
    fn reaches_via_edge(
        edges: &HashMap<LockOwner, HashSet<LockOwner>>,
        start: &LockOwner,
        target: &LockOwner,
    ) -> bool {
        let mut visited = HashSet::new();
        let mut stack: Vec<LockOwner> = edges
            .get(start)
            .map(|n| n.iter().cloned().collect())
            .unwrap_or_default();
        while let Some(node) = stack.pop() {
            if node == *target {
                return true;
            }
            if visited.insert(node.clone()) {
                if let Some(neighbors) = edges.get(&node) {
                    stack.extend(neighbors.iter().cloned());
                }
            }
        }
        false
    }
}
