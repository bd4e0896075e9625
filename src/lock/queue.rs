//! Per-file blocking queue and grant-callback dispatch (spec.md §4.1, §5).
//!
//! The FIFO itself is a `Mutex<VecDeque<Arc<Waiter>>>` per file — waiters
//! must be scanned and individually cancellable by `(owner, range)`, which
//! a lock-free queue doesn't give us cheaply. The hand-off from "a waiter
//! just became grantable" to "fire its callback with a bounded timeout"
//! *is* a natural lock-free MPMC pipe, so that stage runs through a
//! [`crossbeam_queue::SegQueue`] drained by a background dispatcher task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_queue::SegQueue;

use crate::lock::owner::LockOwner;
use crate::lock::range::Range;
use crate::model::FileHandle;

/// SHARED or EXCLUSIVE, mirrored from [`crate::lock::LockKind`] to avoid a
/// cyclic module reference; the two are always kept in sync.
pub use crate::lock::LockKind;

/// Callback endpoint a granted waiter is notified through: NLM_GRANTED
/// for NLM, the oplock-break-ack path for SMB. Fire-and-forget with a
/// total (dial + RPC) timeout enforced by the dispatcher, not the
/// implementation.
#[async_trait]
pub trait GrantCallback: Send + Sync {
    async fn notify_granted(&self) -> Result<(), CallbackFailed>;
}

#[derive(Debug)]
pub struct CallbackFailed;

static NEXT_WAITER_ID: AtomicU64 = AtomicU64::new(1);

pub struct Waiter {
    pub id: u64,
    pub owner: LockOwner,
    pub range: Range,
    pub kind: LockKind,
    pub callback: Arc<dyn GrantCallback>,
    cancelled: AtomicBool,
}

impl Waiter {
    pub fn new(owner: LockOwner, range: Range, kind: LockKind, callback: Arc<dyn GrantCallback>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_WAITER_ID.fetch_add(1, Ordering::Relaxed),
            owner,
            range,
            kind,
            callback,
            cancelled: AtomicBool::new(false),
        })
    }

    /// Idempotent, thread-safe cancellation (spec.md §5).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    Full,
}

/// A waiter that just became grantable, handed to the callback dispatcher.
pub struct PendingGrant {
    pub file: FileHandle,
    pub waiter: Arc<Waiter>,
}

/// Per-file FIFOs plus the shared grant-dispatch pipe.
pub struct BlockingQueues {
    queues: dashmap::DashMap<FileHandle, Mutex<VecDeque<Arc<Waiter>>>>,
    max_depth: usize,
    pub(crate) pending_grants: SegQueue<PendingGrant>,
}

impl BlockingQueues {
    pub fn new(max_depth: usize) -> Self {
        Self {
            queues: dashmap::DashMap::new(),
            max_depth,
            pending_grants: SegQueue::new(),
        }
    }

    pub fn enqueue(&self, file: &FileHandle, waiter: Arc<Waiter>) -> EnqueueOutcome {
        let entry = self
            .queues
            .entry(file.clone())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut q = entry.lock().unwrap();
        if q.len() >= self.max_depth {
            return EnqueueOutcome::Full;
        }
        q.push_back(waiter);
        EnqueueOutcome::Enqueued
    }

    pub fn depth(&self, file: &FileHandle) -> usize {
        self.queues
            .get(file)
            .map(|q| q.lock().unwrap().len())
            .unwrap_or(0)
    }

    /// Cancels the first non-cancelled waiter matching `owner`/`range`.
    pub fn cancel(&self, file: &FileHandle, owner: &LockOwner, range: &Range) -> bool {
        let Some(q) = self.queues.get(file) else {
            return false;
        };
        let q = q.lock().unwrap();
        for w in q.iter() {
            if &w.owner == owner && &w.range == range && !w.is_cancelled() {
                w.cancel();
                return true;
            }
        }
        false
    }

    pub fn remove_owner(&self, file: &FileHandle, owner: &LockOwner) {
        if let Some(q) = self.queues.get(file) {
            for w in q.lock().unwrap().iter() {
                if &w.owner == owner {
                    w.cancel();
                }
            }
        }
    }

    /// Removes and returns every waiter currently queued for `file`,
    /// leaving the queue empty. Used by the grant-visit pass, which
    /// re-enqueues whatever it could not grant this round.
    pub fn drain(&self, file: &FileHandle) -> Vec<Arc<Waiter>> {
        let Some(q) = self.queues.get(file) else {
            return Vec::new();
        };
        q.lock().unwrap().drain(..).collect()
    }

    pub fn requeue_front(&self, file: &FileHandle, waiters: Vec<Arc<Waiter>>) {
        if waiters.is_empty() {
            return;
        }
        let entry = self
            .queues
            .entry(file.clone())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut q = entry.lock().unwrap();
        for w in waiters.into_iter().rev() {
            q.push_front(w);
        }
    }

    pub fn push_pending_grant(&self, file: FileHandle, waiter: Arc<Waiter>) {
        self.pending_grants.push(PendingGrant { file, waiter });
    }
}

/// Runs `notify_granted` with the total 5 s (dial + RPC) timeout from
/// spec.md §4.1/§5. Returns whether the callback succeeded — on failure
/// the caller must release the grant immediately to avoid an orphaned
/// lock.
pub async fn dispatch_with_timeout(waiter: &Waiter, timeout: Duration) -> bool {
    if waiter.is_cancelled() {
        // A cancelled waiter that already had its callback fired still
        // needs the grant released; the caller treats "not delivered" the
        // same either way.
        return false;
    }
    matches!(
        tokio::time::timeout(timeout, waiter.callback.notify_granted()).await,
        Ok(Ok(()))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Protocol;

    struct AlwaysOk;
    #[async_trait]
    impl GrantCallback for AlwaysOk {
        async fn notify_granted(&self) -> Result<(), CallbackFailed> {
            Ok(())
        }
    }

    struct AlwaysFail;
    #[async_trait]
    impl GrantCallback for AlwaysFail {
        async fn notify_granted(&self) -> Result<(), CallbackFailed> {
            Err(CallbackFailed)
        }
    }

    fn owner(id: &str) -> LockOwner {
        LockOwner {
            owner_id: id.into(),
            protocol: Protocol::Nfs3,
        }
    }

    #[test]
    fn enqueue_respects_max_depth() {
        let q = BlockingQueues::new(1);
        let f = FileHandle(vec![1]);
        let w1 = Waiter::new(owner("a"), Range::new(0, 1), LockKind::Exclusive, Arc::new(AlwaysOk));
        let w2 = Waiter::new(owner("b"), Range::new(0, 1), LockKind::Exclusive, Arc::new(AlwaysOk));
        assert_eq!(q.enqueue(&f, w1), EnqueueOutcome::Enqueued);
        assert_eq!(q.enqueue(&f, w2), EnqueueOutcome::Full);
    }

    #[test]
    fn cancel_is_idempotent() {
        let q = BlockingQueues::new(10);
        let f = FileHandle(vec![1]);
        let range = Range::new(0, 1);
        let w = Waiter::new(owner("a"), range, LockKind::Exclusive, Arc::new(AlwaysOk));
        q.enqueue(&f, w.clone());
        assert!(q.cancel(&f, &owner("a"), &range));
        assert!(w.is_cancelled());
        // Second cancel of the same waiter finds it already cancelled and
        // reports "not found" rather than double-firing anything.
        assert!(!q.cancel(&f, &owner("a"), &range));
    }

    #[tokio::test]
    async fn failed_callback_reports_not_delivered() {
        let w = Waiter::new(owner("a"), Range::new(0, 1), LockKind::Exclusive, Arc::new(AlwaysFail));
        assert!(!dispatch_with_timeout(&w, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn successful_callback_reports_delivered() {
        let w = Waiter::new(owner("a"), Range::new(0, 1), LockKind::Exclusive, Arc::new(AlwaysOk));
        assert!(dispatch_with_timeout(&w, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn cancelled_waiter_never_reports_delivered() {
        let w = Waiter::new(owner("a"), Range::new(0, 1), LockKind::Exclusive, Arc::new(AlwaysOk));
        w.cancel();
        assert!(!dispatch_with_timeout(&w, Duration::from_secs(1)).await);
    }
}
