//! Construction root: one `Runtime` owns one instance of every
//! component and is the `Arc` handle protocol adapters (NFS listener,
//! SMB listener) are built against (spec.md §2 **[ADD]**), generalizing
//! the teacher's single `MamontFs`-per-connection spawn in
//! `lib.rs::handle_forever` to the full component graph.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::Config;
use crate::delegation::DelegationCoordinator;
use crate::lock::LockManager;
use crate::metrics::{Metrics, TracingMetrics};
use crate::nfs::client::ClientStore;
use crate::nfs::session::SessionStore;
use crate::recovery::{ConnectionCloser, ConnectionRegistry, RecoverySupervisor};
use crate::registry::Registry;
use crate::store::{LockStore, MetadataStore, PayloadStore};

pub struct Runtime {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub metrics: Arc<dyn Metrics>,
    pub locks: Arc<LockManager>,
    pub sessions: Arc<SessionStore>,
    pub clients: Arc<ClientStore>,
    pub delegations: Arc<DelegationCoordinator>,
    pub metadata: Arc<dyn MetadataStore>,
    pub payload: Arc<dyn PayloadStore>,
    pub recovery: Arc<RecoverySupervisor>,
    shutdown: watch::Sender<bool>,
}

impl Runtime {
    pub fn new(
        config: Config,
        lock_store: Arc<dyn LockStore>,
        metadata: Arc<dyn MetadataStore>,
        payload: Arc<dyn PayloadStore>,
        connection_closer: Arc<dyn ConnectionCloser>,
    ) -> Arc<Self> {
        let metrics: Arc<dyn Metrics> = Arc::new(TracingMetrics);
        let registry = Arc::new(Registry::new());

        let locks = Arc::new(LockManager::new(
            lock_store,
            metrics.clone(),
            Duration::from_secs(config.grace_seconds),
            config.max_queue_per_file,
            Duration::from_secs(config.callback_timeout_seconds),
        ));

        let sessions = Arc::new(SessionStore::new());
        let clients = Arc::new(ClientStore::new(
            Duration::from_secs(config.lease_seconds),
            config.max_sessions_per_client,
        ));

        let delegations = Arc::new(DelegationCoordinator::new(registry.clone(), metrics.clone(), &config));

        let connections = ConnectionRegistry::new();
        let recovery = Arc::new(RecoverySupervisor::new(
            Duration::from_secs(config.grace_seconds),
            clients.clone(),
            sessions.clone(),
            connections,
            connection_closer,
            Duration::from_secs(config.session_reaper_tick_seconds),
            Duration::from_secs(config.connection_idle_seconds),
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        recovery.spawn(shutdown_rx);

        Arc::new(Self {
            config,
            registry,
            metrics,
            locks,
            sessions,
            clients,
            delegations,
            metadata,
            payload,
            recovery,
            shutdown,
        })
    }

    /// Signals every spawned background task to stop at its next tick.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::owner::LockOwner;
    use crate::lock::range::Range;
    use crate::model::{FileAttr, FileHandle, FileType, FsPath, Timestamp};
    use crate::store::lockstore::{LockStore, PersistedLock};
    use crate::store::metadata::Transaction;
    use async_trait::async_trait;

    #[derive(Default)]
    struct MemLockStore;
    #[async_trait]
    impl LockStore for MemLockStore {
        async fn put(&self, _file: &FileHandle, _lock: PersistedLock) -> crate::error::Result<()> {
            Ok(())
        }
        async fn remove(&self, _file: &FileHandle, _owner: &LockOwner, _range: &Range) -> crate::error::Result<()> {
            Ok(())
        }
        async fn list_for_file(&self, _file: &FileHandle) -> crate::error::Result<Vec<PersistedLock>> {
            Ok(vec![])
        }
        async fn epoch(&self) -> crate::error::Result<u64> {
            Ok(1)
        }
    }

    #[derive(Default)]
    struct MemMetadataStore;
    #[async_trait]
    impl MetadataStore for MemMetadataStore {
        async fn begin(&self) -> crate::error::Result<Box<dyn Transaction>> {
            unimplemented!()
        }
        async fn get_file(&self, _handle: &FileHandle) -> crate::error::Result<FileAttr> {
            Ok(FileAttr {
                file_type: FileType::Regular,
                mode: 0o644,
                uid: 0,
                gid: 0,
                nlink: 1,
                size: 0,
                mtime: Timestamp::default(),
                atime: Timestamp::default(),
                ctime: Timestamp::default(),
                btime: Timestamp::default(),
                acl: None,
            })
        }
        async fn put_file(&self, _handle: &FileHandle, _attr: FileAttr) -> crate::error::Result<()> {
            Ok(())
        }
        async fn lookup(&self, _parent: &FileHandle, _name: &str) -> crate::error::Result<FileHandle> {
            Err(crate::error::Error::NotFound)
        }
        async fn list_children(&self, _parent: &FileHandle) -> crate::error::Result<Vec<(String, FileHandle)>> {
            Ok(vec![])
        }
        async fn create_root(&self) -> crate::error::Result<FileHandle> {
            Ok(FileHandle(vec![0]))
        }
        async fn get_path(&self, _handle: &FileHandle) -> crate::error::Result<FsPath> {
            Ok(FsPath(std::path::PathBuf::from("/")))
        }
        async fn set_path(&self, _handle: &FileHandle, _path: FsPath) -> crate::error::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemPayloadStore;
    #[async_trait]
    impl PayloadStore for MemPayloadStore {
        async fn read_block(&self, _file: &FileHandle, _block_index: u64) -> crate::error::Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn put_block(&self, _file: &FileHandle, _block_index: u64, _bytes: Vec<u8>) -> crate::error::Result<()> {
            Ok(())
        }
        async fn truncate(&self, _file: &FileHandle, _block_count: u64) -> crate::error::Result<()> {
            Ok(())
        }
    }

    struct NoopCloser;
    #[async_trait]
    impl ConnectionCloser for NoopCloser {
        async fn close(&self, _connection_id: u64) {}
    }

    #[tokio::test]
    async fn runtime_wires_every_component_and_shuts_down_cleanly() {
        let runtime = Runtime::new(
            Config::default(),
            Arc::new(MemLockStore),
            Arc::new(MemMetadataStore),
            Arc::new(MemPayloadStore),
            Arc::new(NoopCloser),
        );
        assert!(runtime.recovery.is_active());
        assert_eq!(runtime.clients.max_sessions_per_client(), 16);
        runtime.shutdown();
    }
}
