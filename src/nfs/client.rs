//! Client record lifecycle, `CREATE_SESSION`/`DESTROY_SESSION` handling
//! and the session reaper (spec.md §4.2).
//!
//! `CREATE_SESSION` and `DESTROY_SESSION` are permitted outside (indeed,
//! before) any session exists, so unlike every other NFSv4.1 operation
//! they never pass through [`crate::nfs::compound::run_compound`]'s
//! `SEQUENCE` gate. The wire-codec layer calls [`create_session`] and
//! [`destroy_session`] directly once it has decoded their arguments,
//! the same way it calls straight into [`crate::nfs::nlm`] for NLM's
//! synchronous procedures.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use whirlwind::ShardMap;

use crate::error::{Error, SessionErrorKind, SlotErrorKind};
use crate::nfs::session::{generate_session_id, Session, SessionId, SessionStore};

/// RFC 8881 §18.36's three-case replay detection for `CREATE_SESSION`
/// itself, which happens before any session (and thus slot table)
/// exists to de-duplicate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateSessionOutcome {
    New,
    Retry(Vec<u8>),
    Misordered,
}

struct ClientState {
    confirmed: bool,
    lease_expires: Instant,
    unconfirmed_since: Instant,
    sessions: HashSet<SessionId>,
    create_session_seqid: u32,
    cached_create_session_reply: Option<Vec<u8>>,
}

pub struct ClientRecord {
    pub client_id: u64,
    state: Mutex<ClientState>,
}

impl ClientRecord {
    fn new(client_id: u64, lease: Duration) -> Self {
        let now = Instant::now();
        Self {
            client_id,
            state: Mutex::new(ClientState {
                confirmed: false,
                lease_expires: now + lease,
                unconfirmed_since: now,
                sessions: HashSet::new(),
                create_session_seqid: 0,
                cached_create_session_reply: None,
            }),
        }
    }

    pub fn confirm(&self) {
        self.state.lock().unwrap().confirmed = true;
    }

    pub fn renew_lease(&self, lease: Duration) {
        self.state.lock().unwrap().lease_expires = Instant::now() + lease;
    }

    pub fn is_lease_expired(&self) -> bool {
        Instant::now() >= self.state.lock().unwrap().lease_expires
    }

    /// Unconfirmed client records are reaped at 2x the lease interval
    /// rather than the lease itself (spec.md §4.2).
    pub fn is_stale_unconfirmed(&self, lease: Duration) -> bool {
        let state = self.state.lock().unwrap();
        !state.confirmed && state.unconfirmed_since.elapsed() > lease * 2
    }

    /// Applies RFC 8881 §18.36 replay detection for this `CREATE_SESSION`
    /// call. On `New` the caller must later call
    /// [`ClientRecord::complete_create_session`] with the result.
    pub fn check_create_session(&self, seqid: u32) -> CreateSessionOutcome {
        let state = self.state.lock().unwrap();
        if seqid == state.create_session_seqid.wrapping_add(1) {
            CreateSessionOutcome::New
        } else if seqid == state.create_session_seqid {
            match &state.cached_create_session_reply {
                Some(reply) => CreateSessionOutcome::Retry(reply.clone()),
                None => CreateSessionOutcome::Misordered,
            }
        } else {
            CreateSessionOutcome::Misordered
        }
    }

    pub fn complete_create_session(&self, seqid: u32, reply: Vec<u8>, session_id: SessionId) {
        let mut state = self.state.lock().unwrap();
        state.create_session_seqid = seqid;
        state.cached_create_session_reply = Some(reply);
        state.sessions.insert(session_id);
    }

    pub fn forget_session(&self, session_id: &SessionId) {
        self.state.lock().unwrap().sessions.remove(session_id);
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.state.lock().unwrap().sessions.iter().copied().collect()
    }
}

/// Outcome of a successful `CREATE_SESSION` call, once RFC 8881 §18.36
/// replay detection has let it through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateSessionReply {
    Created(SessionId),
    /// Byte-identical replay of the last successful reply.
    Retry(Vec<u8>),
}

/// Runs `CREATE_SESSION` end to end (spec.md §4.2): RFC 8881 §18.36
/// replay detection on the client record, the per-client session cap,
/// and — only once both pass — creation of the session itself and its
/// slot tables.
pub async fn create_session(
    clients: &ClientStore,
    sessions: &SessionStore,
    client_id: u64,
    seqid: u32,
    max_slots_fore: usize,
    max_slots_back: usize,
) -> Result<CreateSessionReply, Error> {
    let record = clients.get_or_create(client_id).await;
    match record.check_create_session(seqid) {
        CreateSessionOutcome::Retry(reply) => Ok(CreateSessionReply::Retry(reply)),
        CreateSessionOutcome::Misordered => Err(Error::SlotError(SlotErrorKind::Misordered)),
        CreateSessionOutcome::New => {
            if record.session_ids().len() >= clients.max_sessions_per_client() {
                return Err(Error::SessionError(SessionErrorKind::TooManySessions));
            }
            let session_id = generate_session_id();
            let session = std::sync::Arc::new(Session::new(
                session_id,
                client_id,
                max_slots_fore,
                max_slots_back,
            ));
            sessions.insert(session).await;
            record.confirm();
            record.complete_create_session(seqid, session_id.to_vec(), session_id);
            Ok(CreateSessionReply::Created(session_id))
        }
    }
}

/// Runs `DESTROY_SESSION` (spec.md §4.2): removes the session from its
/// store and forgets it on the owning client record so it stops counting
/// against that client's session cap.
pub async fn destroy_session(
    clients: &ClientStore,
    sessions: &SessionStore,
    session_id: SessionId,
    force: bool,
) -> Result<(), Error> {
    let client_id = sessions
        .get(&session_id)
        .await
        .ok_or(Error::SessionError(SessionErrorKind::BadSession))?
        .client_id;
    sessions
        .destroy(&session_id, force)
        .await
        .map_err(Error::SessionError)?;
    if let Some(record) = clients.get(client_id).await {
        record.forget_session(&session_id);
    }
    Ok(())
}

/// Directory of client records plus the 30-second-tick session reaper
/// (spec.md §4.2).
pub struct ClientStore {
    clients: ShardMap<u64, std::sync::Arc<ClientRecord>>,
    /// Mirrors `clients`' key set so the reaper can enumerate it without
    /// depending on `ShardMap` exposing a full iterator.
    known_ids: Mutex<HashSet<u64>>,
    lease: Duration,
    max_sessions_per_client: usize,
}

impl ClientStore {
    pub fn new(lease: Duration, max_sessions_per_client: usize) -> Self {
        Self {
            clients: ShardMap::new(),
            known_ids: Mutex::new(HashSet::new()),
            lease,
            max_sessions_per_client,
        }
    }

    pub async fn get_or_create(&self, client_id: u64) -> std::sync::Arc<ClientRecord> {
        if let Some(entry) = self.clients.get(&client_id).await {
            return entry.value().clone();
        }
        let record = std::sync::Arc::new(ClientRecord::new(client_id, self.lease));
        self.clients.insert(client_id, record.clone()).await;
        self.known_ids.lock().unwrap().insert(client_id);
        record
    }

    pub async fn get(&self, client_id: u64) -> Option<std::sync::Arc<ClientRecord>> {
        self.clients.get(&client_id).await.map(|e| e.value().clone())
    }

    pub fn max_sessions_per_client(&self) -> usize {
        self.max_sessions_per_client
    }

    /// One tick of the session reaper: destroys every session belonging
    /// to a client whose lease has expired, or whose unconfirmed
    /// lifetime exceeds 2x the lease (spec.md §4.2).
    pub async fn reap_tick(&self, sessions: &SessionStore) {
        let ids: Vec<u64> = self.known_ids.lock().unwrap().iter().copied().collect();
        let mut reaped = Vec::new();
        for id in ids {
            let Some(record) = self.clients.get(&id).await.map(|e| e.value().clone()) else {
                continue;
            };
            if record.is_lease_expired() || record.is_stale_unconfirmed(self.lease) {
                reaped.push(record);
            }
        }
        for record in reaped {
            for session_id in record.session_ids() {
                let _ = sessions.destroy(&session_id, true).await;
                record.forget_session(&session_id);
            }
            self.clients.remove(&record.client_id).await;
            self.known_ids.lock().unwrap().remove(&record.client_id);
            tracing::info!(client_id = record.client_id, "reaped expired client record");
        }
    }
}
