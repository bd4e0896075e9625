//! Metadata store capability (spec.md §6).

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{FileAttr, FileHandle, FsPath};

/// A unit of work in which multiple metadata mutations — e.g. a rename's
/// BFS-wide path update, or a write's deferred SUID-clear `SETATTR` —
/// are applied atomically.
#[async_trait]
pub trait Transaction: Send {
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn abort(self: Box<Self>);
}

/// Contract the metadata backend (in-memory, embedded KV, SQL, ...) must
/// satisfy. The lock manager embeds lock mutations in the same
/// transaction as the file mutation that triggered them when possible
/// (spec.md §5).
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    async fn get_file(&self, handle: &FileHandle) -> Result<FileAttr>;

    async fn put_file(&self, handle: &FileHandle, attr: FileAttr) -> Result<()>;

    async fn lookup(&self, parent: &FileHandle, name: &str) -> Result<FileHandle>;

    async fn list_children(&self, parent: &FileHandle) -> Result<Vec<(String, FileHandle)>>;

    async fn create_root(&self) -> Result<FileHandle>;

    /// Path of a handle, used by the rename BFS to rewrite descendants
    /// (spec.md §4.5).
    async fn get_path(&self, handle: &FileHandle) -> Result<FsPath>;

    async fn set_path(&self, handle: &FileHandle, path: FsPath) -> Result<()>;
}

/// Renames a directory by rewriting its own path field and every
/// descendant's, within one transaction (spec.md §4.5). Traversal is an
/// iterative BFS rather than recursion, both to avoid blowing the stack
/// on a deep tree and to bound the transaction's duration by the tree's
/// width rather than its depth.
pub async fn rename_directory_subtree(
    store: &dyn MetadataStore,
    directory: &FileHandle,
    new_path: FsPath,
) -> Result<()> {
    let txn = store.begin().await?;
    match rewrite_subtree_paths(store, directory, new_path).await {
        Ok(()) => txn.commit().await,
        Err(err) => {
            txn.abort().await;
            Err(err)
        }
    }
}

async fn rewrite_subtree_paths(store: &dyn MetadataStore, directory: &FileHandle, new_path: FsPath) -> Result<()> {
    store.set_path(directory, new_path.clone()).await?;

    let mut frontier: VecDeque<(FileHandle, FsPath)> = VecDeque::new();
    frontier.push_back((directory.clone(), new_path));

    while let Some((parent, parent_path)) = frontier.pop_front() {
        for (name, child) in store.list_children(&parent).await? {
            let child_path = FsPath(parent_path.0.join(&name));
            store.set_path(&child, child_path.clone()).await?;
            frontier.push_back((child, child_path));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileType, Timestamp};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct FakeTransaction {
        aborted: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait]
    impl Transaction for FakeTransaction {
        async fn commit(self: Box<Self>) -> Result<()> {
            Ok(())
        }
        async fn abort(self: Box<Self>) {
            self.aborted.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct TreeStore {
        paths: Mutex<HashMap<Vec<u8>, FsPath>>,
        children: Mutex<HashMap<Vec<u8>, Vec<(String, FileHandle)>>>,
        abort_flag: std::sync::Arc<std::sync::atomic::AtomicBool>,
        fail_on_child_named: Option<&'static str>,
    }

    fn attr() -> FileAttr {
        FileAttr {
            file_type: FileType::Directory,
            mode: 0o755,
            uid: 0,
            gid: 0,
            nlink: 1,
            size: 0,
            mtime: Timestamp::default(),
            atime: Timestamp::default(),
            ctime: Timestamp::default(),
            btime: Timestamp::default(),
            acl: None,
        }
    }

    #[async_trait]
    impl MetadataStore for TreeStore {
        async fn begin(&self) -> Result<Box<dyn Transaction>> {
            Ok(Box::new(FakeTransaction { aborted: self.abort_flag.clone() }))
        }
        async fn get_file(&self, _handle: &FileHandle) -> Result<FileAttr> {
            Ok(attr())
        }
        async fn put_file(&self, _handle: &FileHandle, _attr: FileAttr) -> Result<()> {
            Ok(())
        }
        async fn lookup(&self, _parent: &FileHandle, _name: &str) -> Result<FileHandle> {
            unimplemented!()
        }
        async fn list_children(&self, parent: &FileHandle) -> Result<Vec<(String, FileHandle)>> {
            if let Some(bad) = self.fail_on_child_named {
                if self
                    .children
                    .lock()
                    .unwrap()
                    .get(&parent.0)
                    .map(|c| c.iter().any(|(name, _)| name == bad))
                    .unwrap_or(false)
                {
                    return Err(crate::error::Error::StaleHandle);
                }
            }
            Ok(self.children.lock().unwrap().get(&parent.0).cloned().unwrap_or_default())
        }
        async fn create_root(&self) -> Result<FileHandle> {
            unimplemented!()
        }
        async fn get_path(&self, handle: &FileHandle) -> Result<FsPath> {
            self.paths
                .lock()
                .unwrap()
                .get(&handle.0)
                .cloned()
                .ok_or(crate::error::Error::NotFound)
        }
        async fn set_path(&self, handle: &FileHandle, path: FsPath) -> Result<()> {
            self.paths.lock().unwrap().insert(handle.0.clone(), path);
            Ok(())
        }
    }

    #[tokio::test]
    async fn renaming_a_leaf_directory_only_rewrites_itself() {
        let store = TreeStore::default();
        let dir = FileHandle(vec![1]);
        rename_directory_subtree(&store, &dir, FsPath(PathBuf::from("/b")))
            .await
            .unwrap();
        assert_eq!(store.get_path(&dir).await.unwrap(), FsPath(PathBuf::from("/b")));
    }

    #[tokio::test]
    async fn renaming_a_directory_rewrites_every_descendant_path() {
        let store = TreeStore::default();
        let dir = FileHandle(vec![1]);
        let child = FileHandle(vec![2]);
        let grandchild = FileHandle(vec![3]);
        store
            .children
            .lock()
            .unwrap()
            .insert(dir.0.clone(), vec![("child".to_string(), child.clone())]);
        store
            .children
            .lock()
            .unwrap()
            .insert(child.0.clone(), vec![("grandchild".to_string(), grandchild.clone())]);

        rename_directory_subtree(&store, &dir, FsPath(PathBuf::from("/renamed")))
            .await
            .unwrap();

        assert_eq!(store.get_path(&dir).await.unwrap(), FsPath(PathBuf::from("/renamed")));
        assert_eq!(
            store.get_path(&child).await.unwrap(),
            FsPath(PathBuf::from("/renamed/child"))
        );
        assert_eq!(
            store.get_path(&grandchild).await.unwrap(),
            FsPath(PathBuf::from("/renamed/child/grandchild"))
        );
    }

    #[tokio::test]
    async fn a_failure_partway_through_the_bfs_aborts_the_transaction() {
        let mut store = TreeStore::default();
        let dir = FileHandle(vec![1]);
        let child = FileHandle(vec![2]);
        store
            .children
            .lock()
            .unwrap()
            .insert(dir.0.clone(), vec![("child".to_string(), child.clone())]);
        store.fail_on_child_named = Some("child");

        let err = rename_directory_subtree(&store, &dir, FsPath(PathBuf::from("/renamed"))).await;
        assert!(err.is_err());
        assert!(store.abort_flag.load(std::sync::atomic::Ordering::SeqCst));
    }
}
