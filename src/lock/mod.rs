//! Unified byte-range lock manager (spec.md §4.1).
//!
//! One [`LockManager`] arbitrates NLM, NFSv4.1 and SMB byte-range locks
//! against a single canonical per-file lock set, so a lock taken over one
//! protocol is visible and enforced against a conflicting request over
//! any other. Per-file state lives behind its own mutex (sharded by
//! [`dashmap::DashMap`]); only the owner-index and the waits-for graph
//! ever need a lock spanning more than one file.

pub mod grace;
pub mod graph;
pub mod owner;
pub mod queue;
pub mod range;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::model::FileHandle;
use crate::store::lockstore::{LockStore, PersistedLock};

use grace::GraceState;
use graph::WaitForGraph;
use owner::LockOwner;
use queue::{dispatch_with_timeout, BlockingQueues, GrantCallback, Waiter};
use range::Range;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LockKind {
    Shared,
    Exclusive,
}

impl LockKind {
    /// Whether a lock of `self` conflicts with an existing lock of `other`,
    /// assuming their ranges already overlap (spec.md §4.1: an EXCLUSIVE
    /// lock never overlaps any other lock; two SHARED locks never
    /// conflict with each other).
    fn conflicts_with(self, other: LockKind) -> bool {
        matches!((self, other), (LockKind::Exclusive, _) | (_, LockKind::Exclusive))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LockEntry {
    owner: LockOwner,
    range: Range,
    kind: LockKind,
}

/// The lock currently blocking a requested range.
#[derive(Debug, Clone)]
pub struct Holder {
    pub owner: LockOwner,
    pub range: Range,
    pub kind: LockKind,
}

#[derive(Debug, Clone)]
pub enum LockResult {
    Granted,
    Conflict(Holder),
    WouldDeadlock,
    GracePeriod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestResult {
    Free,
    Conflict(LockOwner),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelResult {
    Cancelled,
    NotFound,
}

#[derive(Default)]
struct FileLockState {
    entries: Vec<LockEntry>,
}

impl FileLockState {
    fn find_conflict(&self, owner: &LockOwner, range: &Range, kind: LockKind) -> Option<Holder> {
        self.entries.iter().find_map(|e| {
            if &e.owner == owner {
                return None;
            }
            if e.range.overlaps(range) && kind.conflicts_with(e.kind) {
                Some(Holder {
                    owner: e.owner.clone(),
                    range: e.range,
                    kind: e.kind,
                })
            } else {
                None
            }
        })
    }

    /// Replaces whatever `owner` already holds inside `range` with a
    /// single new entry, per POSIX same-owner lock semantics, then
    /// re-coalesces adjacent/overlapping same-kind entries so the set
    /// stays canonical (spec.md §4.1).
    fn merge_owner_lock(&mut self, owner: &LockOwner, range: Range, kind: LockKind) {
        let mut kept = Vec::with_capacity(self.entries.len() + 1);
        for e in self.entries.drain(..) {
            if &e.owner == owner {
                for piece in e.range.subtract(&range) {
                    kept.push(LockEntry {
                        owner: owner.clone(),
                        range: piece,
                        kind: e.kind,
                    });
                }
            } else {
                kept.push(e);
            }
        }
        kept.push(LockEntry {
            owner: owner.clone(),
            range,
            kind,
        });
        self.entries = coalesce(kept);
    }

    /// Removes `range` from whatever `owner` holds on this file.
    fn unlock_owner_range(&mut self, owner: &LockOwner, range: &Range) {
        let mut kept = Vec::with_capacity(self.entries.len());
        for e in self.entries.drain(..) {
            if &e.owner == owner {
                for piece in e.range.subtract(range) {
                    kept.push(LockEntry {
                        owner: owner.clone(),
                        range: piece,
                        kind: e.kind,
                    });
                }
            } else {
                kept.push(e);
            }
        }
        self.entries = kept;
    }

    fn remove_owner(&mut self, owner: &LockOwner) {
        self.entries.retain(|e| &e.owner != owner);
    }
}

/// Sorts by offset and merges neighbouring same-owner, same-kind entries
/// that overlap or touch, so the stored set is always canonical.
fn coalesce(mut entries: Vec<LockEntry>) -> Vec<LockEntry> {
    entries.sort_by_key(|e| e.range.offset);
    let mut out: Vec<LockEntry> = Vec::with_capacity(entries.len());
    for e in entries {
        if let Some(last) = out.last_mut() {
            if last.owner == e.owner
                && last.kind == e.kind
                && (last.range.overlaps(&e.range) || last.range.adjacent(&e.range))
            {
                last.range = last.range.union(&e.range);
                continue;
            }
        }
        out.push(e);
    }
    out
}

/// Ties the per-file canonical lock set, the waits-for graph, the grace
/// window, the blocking-queue FIFOs and the persistence contract together
/// into the single arbiter every protocol adapter calls into.
pub struct LockManager {
    files: DashMap<FileHandle, Mutex<FileLockState>>,
    owner_index: DashMap<LockOwner, HashSet<FileHandle>>,
    graph: WaitForGraph,
    grace: GraceState,
    queues: BlockingQueues,
    store: Arc<dyn LockStore>,
    metrics: Arc<dyn Metrics>,
    callback_timeout: Duration,
}

impl LockManager {
    pub fn new(
        store: Arc<dyn LockStore>,
        metrics: Arc<dyn Metrics>,
        grace_duration: Duration,
        max_queue_per_file: usize,
        callback_timeout: Duration,
    ) -> Self {
        Self {
            files: DashMap::new(),
            owner_index: DashMap::new(),
            graph: WaitForGraph::new(),
            grace: GraceState::new(grace_duration),
            queues: BlockingQueues::new(max_queue_per_file),
            store,
            metrics,
            callback_timeout,
        }
    }

    pub fn grace(&self) -> &GraceState {
        &self.grace
    }

    fn track_owner(&self, owner: &LockOwner, file: &FileHandle) {
        self.owner_index
            .entry(owner.clone())
            .or_default()
            .insert(file.clone());
    }

    async fn persist_grant(&self, file: &FileHandle, owner: &LockOwner, range: Range, kind: LockKind) -> Result<()> {
        self.store
            .put(
                file,
                PersistedLock {
                    owner: owner.clone(),
                    range,
                    kind,
                },
            )
            .await
    }

    /// Acquires a byte-range lock. Non-blocking requests fail fast with
    /// `Conflict`; blocking requests that collide are queued (after a
    /// deadlock check) and this call suspends until granted or cancelled.
    ///
    /// `reclaim` bypasses the grace-period rejection for a client
    /// re-establishing state it held before the last restart. `callback`
    /// is only ever invoked if this call ends up queued: it is how the
    /// protocol adapter is notified out-of-band once some other task
    /// grants the wait (NLM's `GRANTED` RPC, SMB's break-ack), since by
    /// then the original caller that issued the blocking request has long
    /// since replied `BLOCKED`/`PENDING` and moved on.
    pub async fn lock(
        &self,
        file: &FileHandle,
        owner: &LockOwner,
        range: Range,
        kind: LockKind,
        blocking: bool,
        reclaim: bool,
        callback: Arc<dyn GrantCallback>,
    ) -> Result<LockResult> {
        if self.grace.is_active() && !reclaim {
            self.metrics.lock_grace_denied();
            return Ok(LockResult::GracePeriod);
        }

        let conflict = {
            let entry = self.files.entry(file.clone()).or_default();
            let state = entry.lock().unwrap();
            state.find_conflict(owner, &range, kind)
        };

        let Some(holder) = conflict else {
            let entry = self.files.entry(file.clone()).or_default();
            entry.lock().unwrap().merge_owner_lock(owner, range, kind);
            drop(entry);
            self.persist_grant(file, owner, range, kind).await?;
            self.track_owner(owner, file);
            self.metrics.lock_granted();
            return Ok(LockResult::Granted);
        };

        if !blocking {
            self.metrics.lock_conflict();
            return Ok(LockResult::Conflict(holder));
        }

        if self.graph.try_add_waiter(owner, &[holder.owner.clone()]) {
            self.metrics.lock_deadlock();
            return Ok(LockResult::WouldDeadlock);
        }

        let (tx, rx) = oneshot::channel();
        let waiter = Waiter::new(owner.clone(), range, kind, callback);
        let outcome_slot = Arc::new(Mutex::new(Some(tx)));
        CALLBACK_SLOTS.with_slot(waiter.id, outcome_slot.clone());

        match self.queues.enqueue(file, waiter.clone()) {
            queue::EnqueueOutcome::Full => {
                self.graph.remove_waiter(owner);
                CALLBACK_SLOTS.remove(waiter.id);
                return Err(Error::QueueFull);
            }
            queue::EnqueueOutcome::Enqueued => {}
        }

        match rx.await {
            Ok(WaitOutcome::Granted) => {
                self.metrics.lock_granted();
                Ok(LockResult::Granted)
            }
            Ok(WaitOutcome::Cancelled) | Err(_) => Err(Error::Cancelled),
        }
    }

    /// Releases `range` held by `owner` on `file`. Idempotent: unlocking a
    /// range the owner does not hold succeeds silently.
    pub async fn unlock(&self, file: &FileHandle, owner: &LockOwner, range: Range) -> Result<()> {
        {
            let entry = self.files.entry(file.clone()).or_default();
            entry.lock().unwrap().unlock_owner_range(owner, &range);
        }
        self.store.remove(file, owner, &range).await?;
        self.visit_waiters(file).await;
        Ok(())
    }

    /// Checks whether `range` would conflict, without taking the lock.
    pub fn test(&self, file: &FileHandle, owner: &LockOwner, range: Range, kind: LockKind) -> TestResult {
        let entry = self.files.entry(file.clone()).or_default();
        let state = entry.lock().unwrap();
        match state.find_conflict(owner, &range, kind) {
            Some(h) => TestResult::Conflict(h.owner),
            None => TestResult::Free,
        }
    }

    /// Cancels a still-queued blocking request for `(owner, range)` on
    /// `file`. Returns `NotFound` if it was already granted, already
    /// cancelled, or never queued.
    pub fn cancel_blocking(&self, file: &FileHandle, owner: &LockOwner, range: &Range) -> CancelResult {
        if self.queues.cancel(file, owner, range) {
            self.graph.remove_waiter(owner);
            CancelResult::Cancelled
        } else {
            CancelResult::NotFound
        }
    }

    /// Drops every lock and queued wait `owner` holds on `file` — called
    /// when the owning client record is torn down.
    pub async fn release_owner(&self, file: &FileHandle, owner: &LockOwner) -> Result<()> {
        {
            let entry = self.files.entry(file.clone()).or_default();
            entry.lock().unwrap().remove_owner(owner);
        }
        self.queues.remove_owner(file, owner);
        self.graph.remove_waiter(owner);
        self.store.remove(file, owner, &Range::whole_file()).await?;
        if let Some(mut files) = self.owner_index.get_mut(owner) {
            files.remove(file);
        }
        self.visit_waiters(file).await;
        Ok(())
    }

    /// Releases every lock `owner` holds across every file it has ever
    /// touched — the client-teardown convenience the per-file API alone
    /// doesn't give a session reaper.
    pub async fn release_owner_everywhere(&self, owner: &LockOwner) -> Result<()> {
        let files: Vec<FileHandle> = self
            .owner_index
            .get(owner)
            .map(|f| f.iter().cloned().collect())
            .unwrap_or_default();
        for file in files {
            self.release_owner(&file, owner).await?;
        }
        Ok(())
    }

    /// Re-walks the blocking queue for `file` after a lock was released,
    /// granting whichever head-of-line waiters no longer conflict. Each
    /// grant resolves the waiter's suspended `lock()` call and hands the
    /// grant off to the fire-and-forget callback dispatcher for
    /// protocols (NLM) whose original caller already replied.
    async fn visit_waiters(&self, file: &FileHandle) {
        let drained = self.queues.drain(file);
        let mut still_waiting = Vec::with_capacity(drained.len());
        for waiter in drained {
            if waiter.is_cancelled() {
                self.graph.remove_waiter(&waiter.owner);
                CALLBACK_SLOTS.remove(waiter.id);
                continue;
            }
            let conflict = {
                let entry = self.files.entry(file.clone()).or_default();
                let state = entry.lock().unwrap();
                state.find_conflict(&waiter.owner, &waiter.range, waiter.kind)
            };
            if conflict.is_some() {
                still_waiting.push(waiter);
                continue;
            }

            {
                let entry = self.files.entry(file.clone()).or_default();
                entry
                    .lock()
                    .unwrap()
                    .merge_owner_lock(&waiter.owner, waiter.range, waiter.kind);
            }
            if let Err(e) = self
                .persist_grant(file, &waiter.owner, waiter.range, waiter.kind)
                .await
            {
                tracing::error!(error = %e, "failed to persist queued grant");
            }
            self.track_owner(&waiter.owner, file);
            self.graph.remove_waiter(&waiter.owner);

            if let Some(tx) = CALLBACK_SLOTS.take(waiter.id) {
                let _ = tx.lock().unwrap().take().map(|tx| tx.send(WaitOutcome::Granted));
            }
            self.queues.push_pending_grant(file.clone(), waiter.clone());
            let timeout = self.callback_timeout;
            let metrics = self.metrics.clone();
            let delivered = dispatch_with_timeout(&waiter, timeout).await;
            if !delivered {
                metrics.callback_failed();
                metrics.grant_auto_released();
                if let Err(e) = self.unlock(file, &waiter.owner, waiter.range).await {
                    tracing::error!(error = %e, "failed to release grant after callback failure");
                }
            }
        }
        self.queues.requeue_front(file, still_waiting);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Granted,
    Cancelled,
}

/// Callback for callers that have no out-of-band transport to notify a
/// grant through — a non-blocking caller never queues, so never fires
/// this, and a test harness or an adapter with no registered callback
/// transport is content with the in-process oneshot alone.
pub struct NoopCallback;

#[async_trait::async_trait]
impl GrantCallback for NoopCallback {
    async fn notify_granted(&self) -> std::result::Result<(), queue::CallbackFailed> {
        Ok(())
    }
}

/// Maps a queued waiter's id to the oneshot sender its caller is awaiting
/// on. Kept out of [`Waiter`] itself so `queue.rs` stays free of a
/// dependency back on this module's resolution mechanism.
struct CallbackSlots {
    slots: DashMap<u64, Arc<Mutex<Option<oneshot::Sender<WaitOutcome>>>>>,
}

impl CallbackSlots {
    fn with_slot(&self, id: u64, slot: Arc<Mutex<Option<oneshot::Sender<WaitOutcome>>>>) {
        self.slots.insert(id, slot);
    }

    fn take(&self, id: u64) -> Option<Arc<Mutex<Option<oneshot::Sender<WaitOutcome>>>>> {
        self.slots.remove(&id).map(|(_, v)| v)
    }

    fn remove(&self, id: u64) {
        self.slots.remove(&id);
    }
}

static CALLBACK_SLOTS: once_cell_lazy::Lazy<CallbackSlots> =
    once_cell_lazy::Lazy::new(|| CallbackSlots { slots: DashMap::new() });

/// Minimal `Lazy<T>` so this module doesn't need to add `once_cell` to the
/// dependency table for a single process-wide static.
mod once_cell_lazy {
    use std::sync::OnceLock;

    pub struct Lazy<T> {
        cell: OnceLock<T>,
        init: fn() -> T,
    }

    impl<T> Lazy<T> {
        pub const fn new(init: fn() -> T) -> Self {
            Self {
                cell: OnceLock::new(),
                init,
            }
        }
    }

    impl<T> std::ops::Deref for Lazy<T> {
        type Target = T;
        fn deref(&self) -> &T {
            self.cell.get_or_init(self.init)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;
    use crate::model::Protocol;
    use std::sync::Arc;

    #[derive(Default)]
    struct MemLockStore {
        inner: Mutex<Vec<(FileHandle, PersistedLock)>>,
    }

    #[async_trait::async_trait]
    impl LockStore for MemLockStore {
        async fn put(&self, file: &FileHandle, lock: PersistedLock) -> Result<()> {
            self.inner.lock().unwrap().push((file.clone(), lock));
            Ok(())
        }
        async fn remove(&self, file: &FileHandle, owner: &LockOwner, range: &Range) -> Result<()> {
            self.inner
                .lock()
                .unwrap()
                .retain(|(f, l)| !(f == file && &l.owner == owner && l.range.overlaps(range)));
            Ok(())
        }
        async fn list_for_file(&self, file: &FileHandle) -> Result<Vec<PersistedLock>> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .iter()
                .filter(|(f, _)| f == file)
                .map(|(_, l)| l.clone())
                .collect())
        }
        async fn epoch(&self) -> Result<u64> {
            Ok(1)
        }
    }

    fn manager() -> LockManager {
        LockManager::new(
            Arc::new(MemLockStore::default()),
            Arc::new(NoopMetrics),
            Duration::from_secs(0),
            4,
            Duration::from_secs(1),
        )
    }

    fn owner(id: &str) -> LockOwner {
        LockOwner {
            owner_id: id.into(),
            protocol: Protocol::Nfs3,
        }
    }

    #[tokio::test]
    async fn non_overlapping_locks_from_different_owners_both_grant() {
        let m = manager();
        let f = FileHandle(vec![1]);
        let r1 = m
            .lock(&f, &owner("a"), Range::new(0, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        let r2 = m
            .lock(&f, &owner("b"), Range::new(10, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        assert!(matches!(r1, LockResult::Granted));
        assert!(matches!(r2, LockResult::Granted));
    }

    #[tokio::test]
    async fn overlapping_exclusive_from_other_owner_conflicts() {
        let m = manager();
        let f = FileHandle(vec![1]);
        m.lock(&f, &owner("a"), Range::new(0, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        let r2 = m
            .lock(&f, &owner("b"), Range::new(5, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        match r2 {
            LockResult::Conflict(h) => assert_eq!(h.owner, owner("a")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn two_shared_locks_never_conflict() {
        let m = manager();
        let f = FileHandle(vec![1]);
        m.lock(&f, &owner("a"), Range::new(0, 10), LockKind::Shared, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        let r2 = m
            .lock(&f, &owner("b"), Range::new(0, 10), LockKind::Shared, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        assert!(matches!(r2, LockResult::Granted));
    }

    #[tokio::test]
    async fn same_owner_upgrade_to_exclusive_succeeds_with_no_other_holder() {
        let m = manager();
        let f = FileHandle(vec![1]);
        m.lock(&f, &owner("a"), Range::new(0, 10), LockKind::Shared, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        let r2 = m
            .lock(&f, &owner("a"), Range::new(0, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        assert!(matches!(r2, LockResult::Granted));
        let conflict = m.test(&f, &owner("b"), Range::new(0, 10), LockKind::Shared);
        assert_eq!(conflict, TestResult::Conflict(owner("a")));
    }

    #[tokio::test]
    async fn unlock_then_relock_by_other_owner_succeeds() {
        let m = manager();
        let f = FileHandle(vec![1]);
        m.lock(&f, &owner("a"), Range::new(0, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        m.unlock(&f, &owner("a"), Range::new(0, 10)).await.unwrap();
        let r2 = m
            .lock(&f, &owner("b"), Range::new(0, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        assert!(matches!(r2, LockResult::Granted));
    }

    #[tokio::test]
    async fn unlock_of_unheld_range_is_a_noop_success() {
        let m = manager();
        let f = FileHandle(vec![1]);
        assert!(m.unlock(&f, &owner("a"), Range::new(0, 10)).await.is_ok());
    }

    #[tokio::test]
    async fn grace_period_denies_non_reclaim_lock() {
        let m = LockManager::new(
            Arc::new(MemLockStore::default()),
            Arc::new(NoopMetrics),
            Duration::from_secs(90),
            4,
            Duration::from_secs(1),
        );
        let f = FileHandle(vec![1]);
        let r = m
            .lock(&f, &owner("a"), Range::new(0, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        assert!(matches!(r, LockResult::GracePeriod));
    }

    #[tokio::test]
    async fn grace_period_allows_reclaim_lock() {
        let m = LockManager::new(
            Arc::new(MemLockStore::default()),
            Arc::new(NoopMetrics),
            Duration::from_secs(90),
            4,
            Duration::from_secs(1),
        );
        let f = FileHandle(vec![1]);
        let r = m
            .lock(&f, &owner("a"), Range::new(0, 10), LockKind::Exclusive, false, true, Arc::new(NoopCallback))
            .await
            .unwrap();
        assert!(matches!(r, LockResult::Granted));
    }

    #[tokio::test]
    async fn blocking_conflicting_lock_is_granted_after_release() {
        let m = Arc::new(manager());
        let f = FileHandle(vec![1]);
        m.lock(&f, &owner("a"), Range::new(0, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();

        let m2 = m.clone();
        let f2 = f.clone();
        let waiter_task = tokio::spawn(async move {
            m2.lock(&f2, &owner("b"), Range::new(0, 10), LockKind::Exclusive, true, false, Arc::new(NoopCallback))
                .await
        });

        // Give the waiter task a chance to enqueue before we release.
        tokio::time::sleep(Duration::from_millis(20)).await;
        m.unlock(&f, &owner("a"), Range::new(0, 10)).await.unwrap();

        let result = waiter_task.await.unwrap().unwrap();
        assert!(matches!(result, LockResult::Granted));
    }

    #[tokio::test]
    async fn blocking_lock_that_would_deadlock_is_rejected_without_enqueue() {
        let m = Arc::new(manager());
        let f1 = FileHandle(vec![1]);
        let f2 = FileHandle(vec![2]);
        m.lock(&f1, &owner("a"), Range::new(0, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        m.lock(&f2, &owner("b"), Range::new(0, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();

        let m2 = m.clone();
        let f2c = f2.clone();
        tokio::spawn(async move {
            let _ = m2
                .lock(&f2c, &owner("a"), Range::new(0, 10), LockKind::Exclusive, true, false, Arc::new(NoopCallback))
                .await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = m
            .lock(&f1, &owner("b"), Range::new(0, 10), LockKind::Exclusive, true, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        assert!(matches!(result, LockResult::WouldDeadlock));
    }

    #[tokio::test]
    async fn full_queue_reports_queue_full_error() {
        let m = manager();
        let f = FileHandle(vec![1]);
        m.lock(&f, &owner("holder"), Range::new(0, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        for i in 0..4 {
            let m2 = &m;
            let f2 = f.clone();
            let id = format!("waiter{i}");
            tokio::spawn(async move {
                let _ = m2
                    .lock(&f2, &owner(&id), Range::new(0, 10), LockKind::Exclusive, true, false, Arc::new(NoopCallback))
                    .await;
            });
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = m
            .lock(&f, &owner("overflow"), Range::new(0, 10), LockKind::Exclusive, true, false, Arc::new(NoopCallback))
            .await;
        assert!(matches!(err, Err(Error::QueueFull)));
    }

    #[tokio::test]
    async fn release_owner_everywhere_clears_all_files() {
        let m = manager();
        let f1 = FileHandle(vec![1]);
        let f2 = FileHandle(vec![2]);
        m.lock(&f1, &owner("a"), Range::new(0, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        m.lock(&f2, &owner("a"), Range::new(0, 10), LockKind::Exclusive, false, false, Arc::new(NoopCallback))
            .await
            .unwrap();
        m.release_owner_everywhere(&owner("a")).await.unwrap();
        assert_eq!(m.test(&f1, &owner("b"), Range::new(0, 10), LockKind::Exclusive), TestResult::Free);
        assert_eq!(m.test(&f2, &owner("b"), Range::new(0, 10), LockKind::Exclusive), TestResult::Free);
    }
}
