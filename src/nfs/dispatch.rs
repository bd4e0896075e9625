//! RPC program demux shell (spec.md §4.4, §6): program 100005 (Mount),
//! 100003 (NFS v3/v4/v4.1), 100021 (NLM v4), one shared TCP listener.
//!
//! Per-message XDR framing and procedure argument decoding are a
//! wire-codec concern external to this crate (spec.md §1 Non-goals);
//! this module only owns routing a decoded call to the right engine.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Program {
    Mount,
    Nfs,
    Nlm,
}

pub const MOUNT_PROGRAM: u32 = 100005;
pub const NFS_PROGRAM: u32 = 100003;
pub const NLM_PROGRAM: u32 = 100021;

impl Program {
    pub fn from_rpc_program_number(program: u32) -> Option<Program> {
        match program {
            MOUNT_PROGRAM => Some(Program::Mount),
            NFS_PROGRAM => Some(Program::Nfs),
            NLM_PROGRAM => Some(Program::Nlm),
            _ => None,
        }
    }
}

/// A decoded RPC call header, stripped of its XDR envelope by the
/// transport layer.
pub struct RpcCallHeader {
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// RPC `PROG_UNAVAIL`: program number matches none of the three.
    ProgramUnavailable,
    /// RPC `PROG_MISMATCH`: program matches but not at this version.
    ProgramMismatch,
    /// RPC `PROC_UNAVAIL`: NLM v3 or any procedure this server never
    /// implements for the matched program/version (spec.md §6: "NLM v3
    /// is not supported; NLM v4 sync procedures only").
    ProcedureUnavailable,
}

/// Routes a call header to its [`Program`], applying the version and
/// procedure constraints spec.md §6 names explicitly.
pub fn route(header: &RpcCallHeader) -> Result<Program, DispatchError> {
    let program = Program::from_rpc_program_number(header.program).ok_or(DispatchError::ProgramUnavailable)?;
    match program {
        Program::Mount => {
            if header.version != 3 {
                return Err(DispatchError::ProgramMismatch);
            }
        }
        Program::Nfs => {
            if header.version != 3 && header.version != 4 {
                return Err(DispatchError::ProgramMismatch);
            }
        }
        Program::Nlm => {
            if header.version != 4 {
                // NLM v3 is explicitly unsupported (spec.md §6).
                return Err(DispatchError::ProgramMismatch);
            }
            if !is_supported_nlm4_procedure(header.procedure) {
                return Err(DispatchError::ProcedureUnavailable);
            }
        }
    }
    Ok(program)
}

/// `NULL=0, TEST=1, LOCK=2, CANCEL=3, UNLOCK=4, GRANTED=5` — the
/// synchronous NLM v4 subset this server answers (spec.md §6). The
/// `_MSG`/`_RES` async variants (6-10) and `SHARE`/`UNSHARE`/`NM_LOCK`/
/// `FREE_ALL` (20-24) are out of scope.
fn is_supported_nlm4_procedure(procedure: u32) -> bool {
    matches!(procedure, 0..=5)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(program: u32, version: u32, procedure: u32) -> RpcCallHeader {
        RpcCallHeader { program, version, procedure }
    }

    #[test]
    fn unknown_program_is_unavailable() {
        assert_eq!(route(&header(999999, 1, 0)), Err(DispatchError::ProgramUnavailable));
    }

    #[test]
    fn nfs_v3_and_v4_both_route_to_nfs() {
        assert_eq!(route(&header(NFS_PROGRAM, 3, 0)), Ok(Program::Nfs));
        assert_eq!(route(&header(NFS_PROGRAM, 4, 0)), Ok(Program::Nfs));
    }

    #[test]
    fn nlm_v3_is_rejected_as_version_mismatch() {
        assert_eq!(route(&header(NLM_PROGRAM, 3, 1)), Err(DispatchError::ProgramMismatch));
    }

    #[test]
    fn nlm_v4_async_procedure_is_unavailable() {
        assert_eq!(
            route(&header(NLM_PROGRAM, 4, 6)),
            Err(DispatchError::ProcedureUnavailable)
        );
    }

    #[test]
    fn nlm_v4_granted_is_supported() {
        assert_eq!(route(&header(NLM_PROGRAM, 4, 5)), Ok(Program::Nlm));
    }

    #[test]
    fn mount_requires_v3() {
        assert_eq!(route(&header(MOUNT_PROGRAM, 1, 0)), Err(DispatchError::ProgramMismatch));
        assert_eq!(route(&header(MOUNT_PROGRAM, 3, 0)), Ok(Program::Mount));
    }
}
