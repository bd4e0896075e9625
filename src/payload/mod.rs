//! Payload I/O path: sparse zero-fill reads and the deferred-commit block
//! cache (spec.md §4.5).

pub mod block;
pub mod cache;

pub use block::{Block, BlockState};
pub use cache::BlockCache;
