//! NLM v4 procedure dispatch into the unified [`LockManager`] (spec.md
//! §4.4, §6). NLM v3 is not supported; only the synchronous v4
//! procedures are wired: `NULL`, `TEST`, `LOCK`, `UNLOCK`, `CANCEL`,
//! `GRANTED`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Nlm4Stat;
use crate::lock::owner::LockOwner;
use crate::lock::queue::{CallbackFailed, GrantCallback};
use crate::lock::range::Range;
use crate::lock::{CancelResult, LockKind, LockManager, LockResult, NoopCallback, TestResult};
use crate::model::FileHandle;
use crate::registry::{keys, Registry};

/// Arguments common to `TEST`/`LOCK`/`UNLOCK`/`CANCEL`, already decoded
/// from the NLM4 wire structure by the RPC layer.
pub struct NlmLockArgs {
    pub file: FileHandle,
    pub caller_name: String,
    pub svid: u32,
    pub oh: Vec<u8>,
    pub offset: u64,
    pub length: u64,
    pub exclusive: bool,
}

impl NlmLockArgs {
    fn owner(&self) -> LockOwner {
        LockOwner::nlm(&self.caller_name, self.svid, &self.oh)
    }

    fn range(&self) -> Range {
        Range::new(self.offset, self.length)
    }

    fn kind(&self) -> LockKind {
        if self.exclusive {
            LockKind::Exclusive
        } else {
            LockKind::Shared
        }
    }
}

/// `holder` is populated only on `NLM4_DENIED`, mirroring the wire
/// reply's optional `nlm4_holder`.
pub struct NlmReply {
    pub status: Nlm4Stat,
    pub holder: Option<NlmHolder>,
}

pub struct NlmHolder {
    pub exclusive: bool,
    pub svid: u32,
    pub offset: u64,
    pub length: u64,
}

fn reply(status: Nlm4Stat) -> NlmReply {
    NlmReply { status, holder: None }
}

/// Out-of-band RPC client for the NLM `GRANTED` callback, published on the
/// adapter registry under [`keys::NLM_GRANTED_TRANSPORT`] by whichever
/// component owns an outbound RPC client to blocked callers. This crate
/// never dials a client itself (spec.md §1 Non-goals exclude the wire
/// transport); it only decides when a notification is due and whether a
/// failed one must auto-release the grant.
#[async_trait]
pub trait NlmGrantedTransport: Send + Sync {
    async fn send_granted(&self, caller_name: &str, holder: &NlmHolder) -> bool;
}

pub struct NlmGrantedTransportHandle(pub Arc<dyn NlmGrantedTransport>);

/// Binds one blocked waiter's identity to the registered transport so the
/// lock manager's generic [`GrantCallback`] dispatch can fire the actual
/// `GRANTED` RPC once this waiter is granted.
struct NlmGrantCallback {
    transport: Arc<dyn NlmGrantedTransport>,
    caller_name: String,
    holder: NlmHolder,
}

#[async_trait]
impl GrantCallback for NlmGrantCallback {
    async fn notify_granted(&self) -> Result<(), CallbackFailed> {
        if self.transport.send_granted(&self.caller_name, &self.holder).await {
            Ok(())
        } else {
            Err(CallbackFailed)
        }
    }
}

/// Builds the callback a blocking `LOCK` hands to [`LockManager::lock`]:
/// a real out-of-band `GRANTED` notifier when an `NlmGrantedTransport` is
/// registered, or [`NoopCallback`] when nothing is (e.g. under test, or
/// an adapter that hasn't wired a transport yet) — falling back to the
/// in-process oneshot alone rather than failing the call outright.
fn granted_callback(registry: &Registry, args: &NlmLockArgs) -> Arc<dyn GrantCallback> {
    match registry.get_provider::<NlmGrantedTransportHandle>(keys::NLM_GRANTED_TRANSPORT) {
        Some(handle) => Arc::new(NlmGrantCallback {
            transport: handle.0.clone(),
            caller_name: args.caller_name.clone(),
            holder: NlmHolder {
                exclusive: args.exclusive,
                svid: args.svid,
                offset: args.offset,
                length: args.length,
            },
        }),
        None => Arc::new(NoopCallback),
    }
}

pub fn test(manager: &LockManager, args: &NlmLockArgs) -> NlmReply {
    match manager.test(&args.file, &args.owner(), args.range(), args.kind()) {
        TestResult::Free => reply(Nlm4Stat::Granted),
        TestResult::Conflict(_holder) => NlmReply {
            status: Nlm4Stat::Denied,
            // The conflicting owner's own range/kind isn't threaded back
            // through `TestResult` today; only the fact of conflict is.
            // A full holder echo needs `LockManager::test` broadened to
            // return `Holder`, which is out of scope for this pass.
            holder: None,
        },
    }
}

/// `block` selects NLM's synchronous-vs-asynchronous LOCK: when `true`
/// this call suspends until granted, matching `LockManager::lock`'s
/// blocking contract (spec.md §4.1, §5). `registry` is consulted for a
/// registered [`NlmGrantedTransport`] so a blocking wait that gets granted
/// after this call's own RPC has already replied `BLOCKED` is still
/// notified out-of-band, and released again if that notification fails.
pub async fn lock(
    manager: &Arc<LockManager>,
    registry: &Registry,
    args: NlmLockArgs,
    block: bool,
    reclaim: bool,
) -> NlmReply {
    let callback = granted_callback(registry, &args);
    match manager
        .lock(&args.file, &args.owner(), args.range(), args.kind(), block, reclaim, callback)
        .await
    {
        Ok(LockResult::Granted) => reply(Nlm4Stat::Granted),
        Ok(LockResult::Conflict(holder)) => NlmReply {
            status: Nlm4Stat::Denied,
            holder: Some(NlmHolder {
                exclusive: holder.kind == LockKind::Exclusive,
                svid: 0,
                offset: holder.range.offset,
                length: holder.range.end.map(|e| e - holder.range.offset).unwrap_or(0),
            }),
        },
        Ok(LockResult::WouldDeadlock) => reply(Nlm4Stat::Deadlck),
        Ok(LockResult::GracePeriod) => reply(Nlm4Stat::DeniedGracePeriod),
        Err(crate::error::Error::QueueFull) => reply(Nlm4Stat::DeniedNoLocks),
        Err(_) => reply(Nlm4Stat::Failed),
    }
}

pub async fn unlock(manager: &LockManager, args: &NlmLockArgs) -> NlmReply {
    match manager.unlock(&args.file, &args.owner(), args.range()).await {
        Ok(()) => reply(Nlm4Stat::Granted),
        Err(_) => reply(Nlm4Stat::Failed),
    }
}

pub fn cancel(manager: &LockManager, args: &NlmLockArgs) -> NlmReply {
    match manager.cancel_blocking(&args.file, &args.owner(), &args.range()) {
        CancelResult::Cancelled => reply(Nlm4Stat::Granted),
        CancelResult::NotFound => reply(Nlm4Stat::DeniedNoLocks),
    }
}

/// `GRANTED` is the callback NLM clients receive out-of-band; this
/// server only issues it (via [`crate::lock::queue::GrantCallback`])
/// and never needs to answer one itself as a client.
pub fn null() -> NlmReply {
    reply(Nlm4Stat::Granted)
}
