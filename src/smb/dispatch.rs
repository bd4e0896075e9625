//! SMB dispatcher-facing helpers: the IPC$ pipe share-list cache and
//! `..`-aware path resolution against the metadata service (spec.md
//! §4.7).

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::{FileHandle, FsPath};
use crate::store::MetadataStore;

/// Caches the IPC$ `QUERY_DIRECTORY` share list behind a reader-writer
/// lock with double-checked invalidation: `OnShareChange` flips a
/// generation counter, and only the first caller to observe a stale
/// generation under the write lock actually rebuilds the list — pipe
/// `CREATE` must not rebuild it per call (spec.md §4.7).
pub struct ShareListCache {
    generation: std::sync::atomic::AtomicU64,
    inner: RwLock<CachedList>,
}

struct CachedList {
    generation: u64,
    shares: Vec<String>,
}

impl ShareListCache {
    pub fn new() -> Self {
        Self {
            generation: std::sync::atomic::AtomicU64::new(0),
            inner: RwLock::new(CachedList {
                generation: u64::MAX,
                shares: Vec::new(),
            }),
        }
    }

    /// Invoked by the runtime's `OnShareChange` callback.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    /// Returns the cached share list, rebuilding via `rebuild` only if
    /// the generation has moved since the last build.
    pub async fn get_or_rebuild<F>(&self, rebuild: F) -> Vec<String>
    where
        F: FnOnce() -> Vec<String>,
    {
        let target = self.generation.load(std::sync::atomic::Ordering::SeqCst);
        {
            let guard = self.inner.read().await;
            if guard.generation == target {
                return guard.shares.clone();
            }
        }
        let mut guard = self.inner.write().await;
        if guard.generation == target {
            // Another caller already rebuilt while we waited for the
            // write lock.
            return guard.shares.clone();
        }
        let shares = rebuild();
        guard.generation = target;
        guard.shares = shares.clone();
        shares
    }
}

impl Default for ShareListCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves a multi-component SMB path (already split on `\`) against
/// the metadata service, honouring `..` as a real parent lookup rather
/// than silently dropping the segment (spec.md §4.7).
pub async fn resolve_path(metadata: &Arc<dyn MetadataStore>, root: &FileHandle, components: &[&str]) -> Result<FileHandle> {
    let mut current = root.clone();
    let mut stack = vec![root.clone()];
    for component in components {
        match *component {
            "" | "." => continue,
            ".." => {
                if stack.len() > 1 {
                    stack.pop();
                }
                current = stack.last().cloned().unwrap_or_else(|| root.clone());
            }
            name => {
                current = metadata.lookup(&current, name).await?;
                stack.push(current.clone());
            }
        }
    }
    Ok(current)
}

pub async fn path_of(metadata: &Arc<dyn MetadataStore>, handle: &FileHandle) -> Result<FsPath> {
    metadata.get_path(handle).await
}
