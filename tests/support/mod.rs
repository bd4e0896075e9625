//! Shared in-memory store doubles for the cross-cutting scenario tests
//! in this directory. Each scenario only needs the subset of a store's
//! contract its path actually touches; the rest `unimplemented!()`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use dittofs_core::error::{Error, Result};
use dittofs_core::model::{FileAttr, FileHandle, FsPath};
use dittofs_core::store::metadata::Transaction;
use dittofs_core::store::{MetadataStore, PayloadStore};

#[derive(Default)]
pub struct MemMetadataStore {
    attrs: Mutex<HashMap<Vec<u8>, FileAttr>>,
}

impl MemMetadataStore {
    pub fn seed(&self, handle: &FileHandle, attr: FileAttr) {
        self.attrs.lock().unwrap().insert(handle.0.clone(), attr);
    }
}

#[async_trait]
impl MetadataStore for MemMetadataStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        unimplemented!("not exercised by these scenarios")
    }
    async fn get_file(&self, handle: &FileHandle) -> Result<FileAttr> {
        self.attrs.lock().unwrap().get(&handle.0).cloned().ok_or(Error::NotFound)
    }
    async fn put_file(&self, handle: &FileHandle, attr: FileAttr) -> Result<()> {
        self.attrs.lock().unwrap().insert(handle.0.clone(), attr);
        Ok(())
    }
    async fn lookup(&self, _parent: &FileHandle, _name: &str) -> Result<FileHandle> {
        Err(Error::NotFound)
    }
    async fn list_children(&self, _parent: &FileHandle) -> Result<Vec<(String, FileHandle)>> {
        Ok(vec![])
    }
    async fn create_root(&self) -> Result<FileHandle> {
        Ok(FileHandle(vec![0]))
    }
    async fn get_path(&self, _handle: &FileHandle) -> Result<FsPath> {
        Ok(FsPath(std::path::PathBuf::from("/")))
    }
    async fn set_path(&self, _handle: &FileHandle, _path: FsPath) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemPayloadStore {
    blocks: Mutex<HashMap<(Vec<u8>, u64), Vec<u8>>>,
}

#[async_trait]
impl PayloadStore for MemPayloadStore {
    async fn read_block(&self, file: &FileHandle, block_index: u64) -> Result<Option<Vec<u8>>> {
        Ok(self.blocks.lock().unwrap().get(&(file.0.clone(), block_index)).cloned())
    }
    async fn put_block(&self, file: &FileHandle, block_index: u64, data: Vec<u8>) -> Result<()> {
        self.blocks.lock().unwrap().insert((file.0.clone(), block_index), data);
        Ok(())
    }
    async fn truncate(&self, _file: &FileHandle, _new_len: u64) -> Result<()> {
        Ok(())
    }
}
