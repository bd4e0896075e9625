//! Protocol-agnostic lock owner identity (spec.md §3).

use std::fmt;

use crate::model::Protocol;

/// `{owner_id, protocol}`. `owner_id` is opaque to the lock layer; each
/// protocol adapter constructs it per spec.md §3:
///
/// - NFSv3: `"nlm:{caller}:{svid}:{hex(oh)}"`
/// - NFSv4: `"nfs4:{client_id}:{seqid}:{hex(oh)}"`
/// - SMB:   `"smb:{session_id}:{file_id}"`
///
/// Owners are compared by byte-equality of `owner_id` within the same
/// protocol — two owners from different protocols are never equal even
/// if their `owner_id` strings happen to match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockOwner {
    pub owner_id: String,
    pub protocol: Protocol,
}

impl LockOwner {
    pub fn nlm(caller: &str, svid: u32, oh: &[u8]) -> Self {
        Self {
            owner_id: format!("nlm:{caller}:{svid}:{}", hex_encode(oh)),
            protocol: Protocol::Nfs3,
        }
    }

    pub fn nfs4(client_id: u64, seqid: u32, oh: &[u8]) -> Self {
        Self {
            owner_id: format!("nfs4:{client_id}:{seqid}:{}", hex_encode(oh)),
            protocol: Protocol::Nfs4,
        }
    }

    pub fn smb(session_id: u64, file_id: u64) -> Self {
        Self {
            owner_id: format!("smb:{session_id}:{file_id}"),
            protocol: Protocol::Smb,
        }
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.owner_id)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
