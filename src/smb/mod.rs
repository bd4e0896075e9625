//! SMB2/3 session crypto state machine and dispatcher bridge
//! (spec.md §4.6, §4.7).

pub mod crypto;
pub mod dispatch;
pub mod sd;

pub use crypto::{Dialect, SessionCryptoState, Signer};
