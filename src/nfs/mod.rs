//! NFSv4.1 session/slot-table layer and the COMPOUND dispatch shell
//! built on top of it (spec.md §4.2, §4.4).

pub mod client;
pub mod compound;
pub mod dispatch;
pub mod nlm;
pub mod session;

pub use client::{ClientRecord, ClientStore};
pub use compound::{run_compound, CompoundError, CompoundOp, CompoundReply, CompoundRequest, OpContext};
pub use session::{SeqOutcome, Session, SessionStore, SlotTable};
