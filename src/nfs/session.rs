//! Slot table and session store (spec.md §4.2, RFC 8881 §2.10.6.1).
//!
//! Each slot table is serialised by its own per-slot mutex, never a
//! session-wide or global lock, so unrelated slots on the same session
//! validate concurrently. A slot's cached reply is the verbatim
//! XDR-encoded response body, so a `SeqRetry` replay is byte-identical
//! to the original.

use std::sync::Mutex;
use std::time::Instant;

use whirlwind::ShardMap;

use crate::error::SlotErrorKind;

struct Slot {
    in_use: bool,
    last_seqid: u32,
    cached_reply: Option<Vec<u8>>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            in_use: false,
            last_seqid: 0,
            cached_reply: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeqOutcome {
    /// Slot reserved; the engine should run the compound and call
    /// [`SlotTable::complete`] with the result.
    New,
    /// A byte-identical replay of the cached reply for this seqid.
    Retry(Vec<u8>),
}

/// A fore- or back-channel slot table. `max_slots` is fixed at
/// construction (channel attribute negotiation clamps this once, at
/// `CREATE_SESSION` time).
pub struct SlotTable {
    slots: Vec<Mutex<Slot>>,
}

impl SlotTable {
    pub fn new(max_slots: usize) -> Self {
        let mut slots = Vec::with_capacity(max_slots);
        slots.resize_with(max_slots, || Mutex::new(Slot::default()));
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Validates `seqid` against `slot_id`'s history (RFC 8881 §2.10.6.1).
    /// On `SeqOutcome::New` the slot is marked `in_use` until
    /// [`SlotTable::complete`] is called.
    pub fn validate(&self, slot_id: usize, seqid: u32) -> Result<SeqOutcome, SlotErrorKind> {
        let mutex = self.slots.get(slot_id).ok_or(SlotErrorKind::BadSlot)?;
        let mut slot = mutex.lock().unwrap();
        if slot.in_use {
            return Err(SlotErrorKind::Delay);
        }
        if seqid == slot.last_seqid.wrapping_add(1) {
            slot.in_use = true;
            Ok(SeqOutcome::New)
        } else if seqid == slot.last_seqid {
            match &slot.cached_reply {
                Some(reply) => Ok(SeqOutcome::Retry(reply.clone())),
                None => Err(SlotErrorKind::RetryUncached),
            }
        } else {
            Err(SlotErrorKind::Misordered)
        }
    }

    /// Completes the in-flight request on `slot_id`, advancing
    /// `last_seqid` and caching `reply` iff the client asked for it.
    pub fn complete(&self, slot_id: usize, seqid: u32, reply: Vec<u8>, cache_this: bool) {
        if let Some(mutex) = self.slots.get(slot_id) {
            let mut slot = mutex.lock().unwrap();
            slot.in_use = false;
            slot.last_seqid = seqid;
            slot.cached_reply = if cache_this { Some(reply) } else { None };
        }
    }

    /// Whether any slot is currently reserved — `DESTROY_SESSION`
    /// without `force_destroy` fails with `DELAY` while this holds.
    pub fn any_in_use(&self) -> bool {
        self.slots.iter().any(|m| m.lock().unwrap().in_use)
    }
}

pub type SessionId = [u8; 16];

/// Generates a fresh session ID for `CREATE_SESSION`. Opaque to clients
/// per RFC 8881 §18.36; randomness only needs to avoid collisions with
/// live sessions, not to be cryptographically unpredictable.
pub fn generate_session_id() -> SessionId {
    rand::random()
}

pub struct Session {
    pub session_id: SessionId,
    pub client_id: u64,
    pub fore_channel: SlotTable,
    pub back_channel: SlotTable,
    pub created_at: Instant,
}

impl Session {
    pub fn new(session_id: SessionId, client_id: u64, max_slots_fore: usize, max_slots_back: usize) -> Self {
        Self {
            session_id,
            client_id,
            fore_channel: SlotTable::new(max_slots_fore),
            back_channel: SlotTable::new(max_slots_back),
            created_at: Instant::now(),
        }
    }
}

/// Concurrent session directory, backed by a sharded hash map so lookups
/// on unrelated sessions never contend (spec.md §4.2).
pub struct SessionStore {
    sessions: ShardMap<SessionId, std::sync::Arc<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: ShardMap::new(),
        }
    }

    pub async fn insert(&self, session: std::sync::Arc<Session>) {
        self.sessions.insert(session.session_id, session).await;
    }

    pub async fn get(&self, id: &SessionId) -> Option<std::sync::Arc<Session>> {
        self.sessions.get(id).await.map(|e| e.value().clone())
    }

    /// Fails with `DELAY` unless `force` when any slot on the session is
    /// in use (spec.md §4.2).
    pub async fn destroy(&self, id: &SessionId, force: bool) -> Result<(), crate::error::SessionErrorKind> {
        let Some(session) = self.get(id).await else {
            return Err(crate::error::SessionErrorKind::BadSession);
        };
        if !force && (session.fore_channel.any_in_use() || session.back_channel.any_in_use()) {
            return Err(crate::error::SessionErrorKind::SessionInUse);
        }
        self.sessions.remove(id).await;
        Ok(())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
