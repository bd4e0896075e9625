//! Cross-protocol delegation / oplock coordinator (spec.md §4.3).
//!
//! NFSv4 delegations and SMB oplocks are two names for the same grant:
//! a client-side caching promise the server can revoke. This module owns
//! the grant policy and the revocation bus; the actual break RPC/SMB
//! notification is reached through the [`OplockBreaker`] capability
//! published on the adapter [`crate::registry::Registry`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::metrics::Metrics;
use crate::model::FileHandle;
use crate::registry::{keys, Registry};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DelegationKind {
    Read,
    Write,
}

/// Current holder(s) of a file's delegation. WRITE is always exclusive to
/// one client; READ can be held by any number of clients at once (spec.md
/// §3/§4.3), since a read-only cache is never invalidated by a peer's
/// equally read-only cache.
#[derive(Debug, Clone)]
enum Holders {
    Read(HashSet<String>),
    Write(String),
}

impl Holders {
    fn kind(&self) -> DelegationKind {
        match self {
            Holders::Read(_) => DelegationKind::Read,
            Holders::Write(_) => DelegationKind::Write,
        }
    }
}

#[derive(Debug, Clone)]
struct DelegationState {
    holders: Holders,
    recalling: bool,
}

/// Published on the adapter registry under [`keys::OPLOCK_BREAKER`] by
/// whichever protocol adapter can actually deliver a break notification.
/// A file with no SMB session open still has a provider registered
/// globally; it simply has nothing client-side to notify for that file.
#[async_trait]
pub trait OplockBreaker: Send + Sync {
    async fn break_for_write(&self, file: &FileHandle) -> bool;
    async fn break_for_read(&self, file: &FileHandle) -> bool;
    async fn break_for_delete(&self, file: &FileHandle) -> bool;
}

/// Sized wrapper around the trait object so it can be registered: the
/// registry downcasts to a concrete `Sized` type, and `dyn OplockBreaker`
/// itself is unsized.
pub struct OplockBreakerHandle(pub Arc<dyn OplockBreaker>);

/// Single opener, single-client-read bookkeeping the grant policy reads
/// before handing out a delegation (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenDemand {
    pub opener_count: u32,
    pub wants_write: bool,
    pub back_channel_up: bool,
}

pub struct DelegationCoordinator {
    delegations: Mutex<HashMap<FileHandle, DelegationState>>,
    registry: Arc<Registry>,
    metrics: Arc<dyn Metrics>,
    enabled: bool,
    callback_timeout: Duration,
}

impl DelegationCoordinator {
    pub fn new(registry: Arc<Registry>, metrics: Arc<dyn Metrics>, config: &Config) -> Self {
        Self {
            delegations: Mutex::new(HashMap::new()),
            registry,
            metrics,
            enabled: config.delegations_enabled,
            callback_timeout: Duration::from_secs(config.callback_timeout_seconds),
        }
    }

    /// Decides whether an OPEN should be granted a delegation, per the
    /// policy in spec.md §4.3. Globally disableable, since Linux NFSv4
    /// clients serve delegated writes locally and bypass server-side
    /// SUID clearing.
    pub fn grant_policy(&self, demand: OpenDemand) -> Option<DelegationKind> {
        if !self.enabled {
            return None;
        }
        if demand.opener_count != 1 {
            return None;
        }
        if demand.wants_write {
            (demand.back_channel_up).then_some(DelegationKind::Write)
        } else {
            Some(DelegationKind::Read)
        }
    }

    /// Grants `holder` a delegation of `kind` on `file`. A WRITE grant
    /// replaces whatever was there, since it is exclusive; a READ grant
    /// joins the existing set of readers instead of evicting them, unless
    /// the file currently holds an (exclusive) WRITE delegation, which it
    /// then downgrades to a single-reader READ set.
    pub fn grant(&self, file: FileHandle, kind: DelegationKind, holder: String) {
        let mut delegations = self.delegations.lock().unwrap();
        match kind {
            DelegationKind::Write => {
                delegations.insert(
                    file,
                    DelegationState {
                        holders: Holders::Write(holder),
                        recalling: false,
                    },
                );
            }
            DelegationKind::Read => match delegations.get_mut(&file) {
                Some(state) => match &mut state.holders {
                    Holders::Read(set) => {
                        set.insert(holder);
                    }
                    Holders::Write(_) => {
                        state.holders = Holders::Read(HashSet::from([holder]));
                    }
                },
                None => {
                    delegations.insert(
                        file,
                        DelegationState {
                            holders: Holders::Read(HashSet::from([holder])),
                            recalling: false,
                        },
                    );
                }
            },
        }
        self.metrics.delegation_granted();
    }

    /// Fire-and-forget break dispatch used by NFS write/delete handlers,
    /// which have no mechanism to defer their reply for a break (spec.md
    /// §4.3). A missing provider (SMB disabled) is a no-op success.
    pub async fn break_before_write(&self, file: &FileHandle) {
        self.dispatch_break(file, BreakKind::Write).await;
    }

    pub async fn break_before_read(&self, file: &FileHandle) {
        self.dispatch_break(file, BreakKind::Read).await;
    }

    /// Breaks on delete look up the child's file handle best-effort;
    /// callers must not let a failed lookup block the delete itself
    /// (spec.md §4.3) — this method takes the handle already resolved.
    pub async fn break_before_delete(&self, file: &FileHandle) {
        self.dispatch_break(file, BreakKind::Delete).await;
    }

    async fn dispatch_break(&self, file: &FileHandle, kind: BreakKind) {
        if !self.delegations.lock().unwrap().contains_key(file) {
            return;
        }

        // A missing provider (SMB disabled) is a no-op: there is nobody to
        // deliver the break to, but the delegation is still held, so its
        // state must be left exactly as it was rather than revoked out
        // from under a holder who was never actually notified.
        let Some(handle) = self.registry.get_provider::<OplockBreakerHandle>(keys::OPLOCK_BREAKER) else {
            return;
        };

        if let Some(state) = self.delegations.lock().unwrap().get_mut(file) {
            state.recalling = true;
        }
        let breaker = handle.0.clone();

        let delivered = tokio::time::timeout(self.callback_timeout, async {
            match kind {
                BreakKind::Write => breaker.break_for_write(file).await,
                BreakKind::Read => breaker.break_for_read(file).await,
                BreakKind::Delete => breaker.break_for_delete(file).await,
            }
        })
        .await
        .unwrap_or(false);

        if !delivered {
            self.metrics.callback_failed();
        }
        self.metrics.delegation_recalled();
        self.metrics.oplock_break_dispatched();
        self.revoke(file);
    }

    /// Revokes whatever delegation is held on `file`, whether the break
    /// succeeded or timed out — a dropped back channel must not leave a
    /// delegation that silently lingers. Clears every READ holder along
    /// with a WRITE holder: the break is file-wide, not per-client.
    fn revoke(&self, file: &FileHandle) {
        self.delegations.lock().unwrap().remove(file);
    }

    /// A single representative holder, for callers that only care whether
    /// *anyone* holds a delegation (WRITE's sole holder, or an arbitrary
    /// member of READ's holder set). Use [`DelegationCoordinator::read_holders_of`]
    /// to see every concurrent reader.
    pub fn holder_of(&self, file: &FileHandle) -> Option<String> {
        self.delegations.lock().unwrap().get(file).and_then(|s| match &s.holders {
            Holders::Write(holder) => Some(holder.clone()),
            Holders::Read(holders) => holders.iter().next().cloned(),
        })
    }

    /// Every client currently holding a READ delegation on `file`. Empty
    /// when the file has no delegation, or only a WRITE delegation.
    pub fn read_holders_of(&self, file: &FileHandle) -> Vec<String> {
        self.delegations
            .lock()
            .unwrap()
            .get(file)
            .map(|s| match &s.holders {
                Holders::Read(holders) => holders.iter().cloned().collect(),
                Holders::Write(_) => Vec::new(),
            })
            .unwrap_or_default()
    }

    pub fn kind_of(&self, file: &FileHandle) -> Option<DelegationKind> {
        self.delegations.lock().unwrap().get(file).map(|s| s.holders.kind())
    }
}

#[derive(Debug, Copy, Clone)]
enum BreakKind {
    Write,
    Read,
    Delete,
}
