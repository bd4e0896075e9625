//! Block payload store capability (spec.md §4.2, §6).
//!
//! Blocks are fixed-size and addressed by `(file, block_index)`. A block
//! that was never written is a sparse hole, not an error: `read_block`
//! returns `Ok(None)` for it and the cache zero-fills in its place. Only
//! a genuine backend failure comes back as `Err`.
use async_trait::async_trait;

use crate::error::Result;
use crate::model::FileHandle;

#[async_trait]
pub trait PayloadStore: Send + Sync {
    /// `None` means the block was never written (sparse hole); callers
    /// zero-fill rather than treat this as `NotFound`.
    async fn read_block(&self, file: &FileHandle, block_index: u64) -> Result<Option<Vec<u8>>>;

    async fn put_block(&self, file: &FileHandle, block_index: u64, data: Vec<u8>) -> Result<()>;

    async fn truncate(&self, file: &FileHandle, new_len: u64) -> Result<()>;
}
