//! DittoFS core: the unified byte-range lock manager, NFSv4.1 session
//! layer, cross-protocol oplock/delegation coordinator, SMB3 session
//! crypto state machine and payload I/O invariants shared by DittoFS's
//! NFS and SMB protocol adapters.
//!
//! Protocol adapters (the NFS/Mount/NLM RPC listener, the SMB listener),
//! concrete store backends, identity mapping, the CLI/REST control plane
//! and non-session-path wire codecs are external collaborators; this
//! crate is the hard core they're built around, reached through one
//! [`runtime::Runtime`].

pub mod config;
pub mod delegation;
pub mod error;
pub mod identity;
pub mod lock;
pub mod metrics;
pub mod model;
pub mod nfs;
pub mod payload;
pub mod recovery;
pub mod registry;
pub mod runtime;
pub mod smb;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use runtime::Runtime;
