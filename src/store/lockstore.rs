//! Lock persistence capability (spec.md §4.1, §6).
//!
//! Locks are persisted atomically with the metadata transaction that
//! produced them so a crash cannot leak half-applied lock state. The
//! `epoch` counter lets the manager detect split-brain at boot: two
//! processes claiming the same store epoch indicates a stale takeover.

use async_trait::async_trait;

use crate::error::Result;
use crate::lock::owner::LockOwner;
use crate::lock::range::Range;
use crate::lock::LockKind;
use crate::model::FileHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedLock {
    pub owner: LockOwner,
    pub range: Range,
    pub kind: LockKind,
}

#[async_trait]
pub trait LockStore: Send + Sync {
    async fn put(&self, file: &FileHandle, lock: PersistedLock) -> Result<()>;

    async fn remove(&self, file: &FileHandle, owner: &LockOwner, range: &Range) -> Result<()>;

    async fn list_for_file(&self, file: &FileHandle) -> Result<Vec<PersistedLock>>;

    /// Monotonically increasing generation the store hands out at boot;
    /// used to detect a split-brain takeover (spec.md §4.1).
    async fn epoch(&self) -> Result<u64>;
}
