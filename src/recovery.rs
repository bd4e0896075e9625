//! Grace/recovery supervisor (spec.md §2 component 13): owns the boot
//! grace window, ticks the session reaper, and reaps idle transport
//! connections. Every background task takes a `watch::Receiver<bool>`
//! shutdown signal rather than running as a bare detached `tokio::spawn`
//! (spec.md §5, §9).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex};

use crate::lock::grace::GraceState;
use crate::nfs::client::ClientStore;
use crate::nfs::session::SessionStore;

/// Tracks the last-activity timestamp of one transport connection so the
/// idle reaper can close it without the transport layer itself needing
/// to own a timer.
pub struct ConnectionActivity {
    last_seen: AtomicU64,
    started_at: Instant,
}

impl ConnectionActivity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            last_seen: AtomicU64::new(0),
            started_at: Instant::now(),
        })
    }

    pub fn touch(&self) {
        let elapsed = self.started_at.elapsed().as_secs();
        self.last_seen.store(elapsed, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = self.last_seen.load(Ordering::Relaxed);
        self.started_at.elapsed().saturating_sub(Duration::from_secs(last))
    }
}

/// Connection registry the reaper walks each tick. Adapters register a
/// connection on accept and deregister it on close; the registry itself
/// never closes a socket, it only decides which ones should be.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<Vec<(u64, Arc<ConnectionActivity>)>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register(&self) -> (u64, Arc<ConnectionActivity>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let activity = ConnectionActivity::new();
        self.connections.lock().await.push((id, activity.clone()));
        (id, activity)
    }

    pub async fn deregister(&self, id: u64) {
        self.connections.lock().await.retain(|(existing, _)| *existing != id);
    }

    /// Returns the ids of connections idle past `timeout`, without
    /// closing anything itself — closing the socket is a transport-layer
    /// action this module has no handle to.
    pub async fn idle_past(&self, timeout: Duration) -> Vec<u64> {
        self.connections
            .lock()
            .await
            .iter()
            .filter(|(_, activity)| activity.idle_for() >= timeout)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Callback the transport layer registers so the reaper can actually
/// drop an idle connection's socket.
#[async_trait::async_trait]
pub trait ConnectionCloser: Send + Sync {
    async fn close(&self, connection_id: u64);
}

pub struct RecoverySupervisor {
    pub grace: Arc<GraceState>,
    clients: Arc<ClientStore>,
    sessions: Arc<SessionStore>,
    connections: Arc<ConnectionRegistry>,
    closer: Arc<dyn ConnectionCloser>,
    session_reaper_tick: Duration,
    connection_idle_timeout: Duration,
}

impl RecoverySupervisor {
    pub fn new(
        grace_duration: Duration,
        clients: Arc<ClientStore>,
        sessions: Arc<SessionStore>,
        connections: Arc<ConnectionRegistry>,
        closer: Arc<dyn ConnectionCloser>,
        session_reaper_tick: Duration,
        connection_idle_timeout: Duration,
    ) -> Self {
        Self {
            grace: Arc::new(GraceState::new(grace_duration)),
            clients,
            sessions,
            connections,
            closer,
            session_reaper_tick,
            connection_idle_timeout,
        }
    }

    /// Spawns the session and connection reaper loops, both exiting as
    /// soon as `shutdown` reports `true`.
    pub fn spawn(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let this = self.clone();
        let mut shutdown_for_sessions = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.session_reaper_tick);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.clients.reap_tick(&this.sessions).await;
                    }
                    _ = shutdown_for_sessions.changed() => {
                        if *shutdown_for_sessions.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.connection_idle_timeout.max(Duration::from_secs(1)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for id in this.connections.idle_past(this.connection_idle_timeout).await {
                            this.closer.close(id).await;
                            this.connections.deregister(id).await;
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }
}

impl std::ops::Deref for RecoverySupervisor {
    type Target = GraceState;
    fn deref(&self) -> &GraceState {
        self.grace.as_ref()
    }
}
