//! Store capability interfaces — the contracts metadata, lock and
//! payload backends must satisfy (spec.md §2 component 2, §6).
//!
//! Concrete backends (in-memory, embedded key-value, SQL) live outside
//! this crate; it only constrains the interface the core depends on.

pub mod metadata;
pub mod lockstore;
pub mod payloadstore;

pub use lockstore::LockStore;
pub use metadata::{rename_directory_subtree, MetadataStore};
pub use payloadstore::PayloadStore;
