//! COMPOUND engine: minorversion bifurcation, SEQUENCE short-circuit,
//! and sequential op execution (spec.md §4.4).
//!
//! Individual operation bodies (GETATTR, WRITE, ...) are decoded and
//! encoded by the wire-codec layer outside this crate; this module only
//! owns the part spec.md calls the "hard core" — ordering, slot replay,
//! and minor-version gating. An operation is anything that implements
//! [`CompoundOp`]; the engine never inspects its payload.

use std::sync::Arc;

use async_trait::async_trait;

use crate::identity::RequestContext;
use crate::nfs::session::{SeqOutcome, SessionId, SessionStore};
use crate::registry::Registry;

/// One already-decoded NFSv4 operation. `execute` returns its
/// already-encoded reply body; the engine concatenates these in order
/// to build the COMPOUND response (spec.md §4.4, §5 ordering guarantee:
/// a GETATTR after WRITE in the same COMPOUND observes WRITE's effects
/// because ops run strictly sequentially, never concurrently).
#[async_trait]
pub trait CompoundOp: Send + Sync {
    async fn execute(&self, ctx: &OpContext) -> Vec<u8>;
}

/// Capabilities every op body needs reached through the registry, plus
/// the caller's authenticated identity — generalizes the teacher's
/// per-task channel plumbing into the capability-lookup style spec.md
/// §9 asks for in place of cyclic module imports.
pub struct OpContext {
    pub request: RequestContext,
    pub registry: Arc<Registry>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompoundError {
    /// `minorversion` outside `[v4_min_minor_version, v4_max_minor_version]`.
    MinorVersMismatch,
    /// `minorversion == 1` and the request carried no `SEQUENCE`.
    OpNotInSession,
    Session(crate::error::SessionErrorKind),
    Slot(crate::error::SlotErrorKind),
}

/// A COMPOUND request as handed to the engine by the wire-codec layer:
/// `SEQUENCE`'s arguments (when present) already pulled out of `ops`.
pub struct CompoundRequest {
    pub minorversion: u32,
    pub sequence: Option<SequenceArgs>,
    pub ops: Vec<Box<dyn CompoundOp>>,
}

pub struct SequenceArgs {
    pub session_id: SessionId,
    pub slot_id: usize,
    pub sequence_id: u32,
    pub cache_this: bool,
}

pub struct CompoundReply {
    pub bodies: Vec<Vec<u8>>,
}

/// Runs one COMPOUND request end to end (spec.md §4.4).
pub async fn run_compound(
    sessions: &SessionStore,
    min_minor: u32,
    max_minor: u32,
    request: CompoundRequest,
    ctx: OpContext,
) -> Result<CompoundReply, CompoundError> {
    if request.minorversion < min_minor || request.minorversion > max_minor {
        return Err(CompoundError::MinorVersMismatch);
    }

    if request.minorversion == 0 {
        return Ok(run_ops_sequentially(&request.ops, &ctx).await);
    }

    // minorversion == 1 (the only other value currently in range):
    // the first op must have been SEQUENCE.
    let Some(seq) = request.sequence else {
        return Err(CompoundError::OpNotInSession);
    };

    let session = sessions
        .get(&seq.session_id)
        .await
        .ok_or(CompoundError::Session(crate::error::SessionErrorKind::BadSession))?;

    let outcome = session
        .fore_channel
        .validate(seq.slot_id, seq.sequence_id)
        .map_err(CompoundError::Slot)?;

    match outcome {
        SeqOutcome::Retry(cached) => Ok(CompoundReply { bodies: vec![cached] }),
        SeqOutcome::New => {
            let reply = run_ops_sequentially(&request.ops, &ctx).await;
            let flattened: Vec<u8> = reply.bodies.iter().flat_map(|b| b.iter().copied()).collect();
            session
                .fore_channel
                .complete(seq.slot_id, seq.sequence_id, flattened, seq.cache_this);
            Ok(reply)
        }
    }
}

async fn run_ops_sequentially(ops: &[Box<dyn CompoundOp>], ctx: &OpContext) -> CompoundReply {
    let mut bodies = Vec::with_capacity(ops.len());
    for op in ops {
        bodies.push(op.execute(ctx).await);
    }
    CompoundReply { bodies }
}
