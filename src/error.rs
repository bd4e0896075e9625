//! Domain error taxonomy and wire-status mapping.
//!
//! Every fallible operation in the core returns [`Error`]. Protocol
//! handlers translate it to a wire status code at the last possible
//! point — see [`Error::to_nfs3`], [`Error::to_nfs4`], [`Error::to_nlm4`]
//! and [`Error::to_nt_status`]. Store errors are never surfaced verbatim:
//! they are logged here and folded into `ServerFault`/`SERVERFAULT`.

/// Kind of slot-sequencing failure reported by the NFSv4.1 session layer
/// (RFC 8881 §2.10.6.1).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SlotErrorKind {
    /// Slot index is beyond `max_slots - 1`.
    BadSlot,
    /// `seqid` is neither the expected next value nor a retry of the last one.
    Misordered,
    /// Slot is currently `in_use` by another in-flight request.
    Delay,
    /// Client retried a `seqid` whose reply was never cached.
    RetryUncached,
}

/// Kind of session-lifecycle failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// No session exists for the given session ID.
    BadSession,
    /// The client ID named in the request is unknown or expired.
    StaleClientId,
    /// Session has slots currently in use; destroy was not forced.
    SessionInUse,
    /// The client has exceeded its per-client session cap.
    TooManySessions,
}

/// Domain-internal error kind, translated to wire status at the protocol
/// boundary and never exposed to a store implementation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    Exists,
    #[error("permission denied")]
    PermissionDenied,
    #[error("access denied")]
    AccessDenied,
    #[error("lock conflict")]
    LockConflict,
    #[error("would deadlock")]
    Deadlock,
    #[error("grace period in effect")]
    GracePeriod,
    #[error("session error: {0:?}")]
    SessionError(SessionErrorKind),
    #[error("slot error: {0:?}")]
    SlotError(SlotErrorKind),
    #[error("stale file handle")]
    StaleHandle,
    #[error("blocking queue full")]
    QueueFull,
    #[error("store error: {0}")]
    StoreError(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("cancelled")]
    Cancelled,
    #[error("not supported")]
    NotSupported,
    #[error("invalid argument")]
    InvalidArgument,
}

impl Error {
    /// Wraps an opaque store failure. The raw error is preserved for
    /// logging; callers must not forward its `Display` text to the wire.
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::StoreError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// `nfsstat3` values used by the mapping below (RFC 1813 §2.6).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum NfsStat3 {
    Ok = 0,
    Perm = 1,
    NoEnt = 2,
    Io = 5,
    Access = 13,
    Exist = 17,
    Inval = 22,
    NameTooLong = 63,
    NotEmpty = 66,
    Jukebox = 10008,
    ServerFault = 10006,
    Stale = 70,
    NotSupp = 10004,
}

/// `nfsstat4` values used by the mapping below (RFC 8881 §15.1).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum NfsStat4 {
    Ok = 0,
    Perm = 1,
    NoEnt = 2,
    Access = 13,
    Exist = 17,
    Inval = 22,
    Stale = 70,
    Denied = 10010,
    BadCookie = 10003,
    NotSupp = 10004,
    ServerFault = 10006,
    Grace = 10013,
    Deadlock = 10025,
    BadSessionDigest = 10080,
    BadSession = 10074,
    BadSlot = 10024,
    SeqMisordered = 10063,
    SeqFalseRetry = 10064,
    RetryUncachedRep = 10026,
    Delay = 10008,
    StaleClientid = 10022,
    OpNotInSession = 10084,
    MinorVersMismatch = 10021,
    TooManyOps = 10089,
}

/// `nlm4_stats` values used by the mapping below (RFC 1813 Appendix II).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum Nlm4Stat {
    Granted = 0,
    Denied = 1,
    DeniedNoLocks = 2,
    Blocked = 3,
    DeniedGracePeriod = 4,
    Deadlck = 5,
    RofS = 6,
    StaleFh = 7,
    FBig = 8,
    Failed = 9,
}

/// Subset of `NTSTATUS` values used by the mapping below (MS-ERREF).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum NtStatus {
    Success = 0x0000_0000,
    ObjectNameNotFound = 0xC000_0034,
    ObjectNameCollision = 0xC000_0035,
    AccessDenied = 0xC000_0022,
    LockNotGranted = 0xC000_0055,
    RangeNotLocked = 0xC000_01A1,
    FileLockConflict = 0xC000_0054,
    PossibleDeadlock = 0xC000_0194,
    InvalidParameter = 0xC000_000D,
    NotSupported = 0xC000_00BB,
    InternalError = 0xC000_0001,
    Cancelled = 0xC000_0120,
    BadNetworkName = 0xC000_00CC,
}

impl Error {
    /// Maps this error to an `nfsstat3` value (spec.md §7).
    pub fn to_nfs3(&self) -> NfsStat3 {
        match self {
            Error::NotFound => NfsStat3::NoEnt,
            Error::Exists => NfsStat3::Exist,
            Error::PermissionDenied => NfsStat3::Perm,
            Error::AccessDenied => NfsStat3::Access,
            Error::LockConflict => NfsStat3::Access,
            Error::Deadlock => NfsStat3::Jukebox,
            Error::GracePeriod => NfsStat3::Jukebox,
            Error::SessionError(_) | Error::SlotError(_) => NfsStat3::ServerFault,
            Error::StaleHandle => NfsStat3::Stale,
            Error::QueueFull => NfsStat3::Jukebox,
            Error::StoreError(e) => {
                tracing::error!(error = %e, "store error surfaced as NFS3ERR_SERVERFAULT");
                NfsStat3::ServerFault
            }
            Error::Cancelled => NfsStat3::Io,
            Error::NotSupported => NfsStat3::NotSupp,
            Error::InvalidArgument => NfsStat3::Inval,
        }
    }

    /// Maps this error to an `nfsstat4` value (spec.md §7).
    pub fn to_nfs4(&self) -> NfsStat4 {
        match self {
            Error::NotFound => NfsStat4::NoEnt,
            Error::Exists => NfsStat4::Exist,
            Error::PermissionDenied => NfsStat4::Perm,
            Error::AccessDenied => NfsStat4::Access,
            Error::LockConflict => NfsStat4::Denied,
            Error::Deadlock => NfsStat4::Deadlock,
            Error::GracePeriod => NfsStat4::Grace,
            Error::SessionError(k) => match k {
                SessionErrorKind::BadSession => NfsStat4::BadSession,
                SessionErrorKind::StaleClientId => NfsStat4::StaleClientid,
                SessionErrorKind::SessionInUse => NfsStat4::Delay,
                SessionErrorKind::TooManySessions => NfsStat4::ServerFault,
            },
            Error::SlotError(k) => match k {
                SlotErrorKind::BadSlot => NfsStat4::BadSlot,
                SlotErrorKind::Misordered => NfsStat4::SeqMisordered,
                SlotErrorKind::Delay => NfsStat4::Delay,
                SlotErrorKind::RetryUncached => NfsStat4::RetryUncachedRep,
            },
            Error::StaleHandle => NfsStat4::Stale,
            Error::QueueFull => NfsStat4::Delay,
            Error::StoreError(e) => {
                tracing::error!(error = %e, "store error surfaced as NFS4ERR_SERVERFAULT");
                NfsStat4::ServerFault
            }
            Error::Cancelled => NfsStat4::ServerFault,
            Error::NotSupported => NfsStat4::NotSupp,
            Error::InvalidArgument => NfsStat4::Inval,
        }
    }

    /// Maps this error to an `nlm4_stats` value (spec.md §7).
    pub fn to_nlm4(&self) -> Nlm4Stat {
        match self {
            Error::LockConflict => Nlm4Stat::Denied,
            Error::Deadlock => Nlm4Stat::Deadlck,
            Error::GracePeriod => Nlm4Stat::DeniedGracePeriod,
            Error::QueueFull => Nlm4Stat::DeniedNoLocks,
            Error::StaleHandle => Nlm4Stat::StaleFh,
            Error::StoreError(e) => {
                tracing::error!(error = %e, "store error surfaced as NLM4_FAILED");
                Nlm4Stat::Failed
            }
            _ => Nlm4Stat::Failed,
        }
    }

    /// Maps this error to an `NT_STATUS` value (spec.md §6/§7).
    pub fn to_nt_status(&self) -> NtStatus {
        match self {
            Error::NotFound => NtStatus::ObjectNameNotFound,
            Error::Exists => NtStatus::ObjectNameCollision,
            Error::PermissionDenied | Error::AccessDenied => NtStatus::AccessDenied,
            Error::LockConflict => NtStatus::FileLockConflict,
            Error::Deadlock => NtStatus::PossibleDeadlock,
            Error::GracePeriod => NtStatus::LockNotGranted,
            Error::SessionError(_) | Error::SlotError(_) => NtStatus::InternalError,
            Error::StaleHandle => NtStatus::BadNetworkName,
            Error::QueueFull => NtStatus::LockNotGranted,
            Error::StoreError(e) => {
                tracing::error!(error = %e, "store error surfaced as STATUS_INTERNAL_ERROR");
                NtStatus::InternalError
            }
            Error::Cancelled => NtStatus::Cancelled,
            Error::NotSupported => NtStatus::NotSupported,
            Error::InvalidArgument => NtStatus::InvalidParameter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grace_maps_to_grace_status_per_protocol() {
        assert_eq!(Error::GracePeriod.to_nfs4() as u32, NfsStat4::Grace as u32);
        assert_eq!(
            Error::GracePeriod.to_nlm4() as u32,
            Nlm4Stat::DeniedGracePeriod as u32
        );
    }

    #[test]
    fn deadlock_maps_across_protocols() {
        assert_eq!(Error::Deadlock.to_nfs4() as u32, NfsStat4::Deadlock as u32);
        assert_eq!(Error::Deadlock.to_nlm4() as u32, Nlm4Stat::Deadlck as u32);
        assert_eq!(
            Error::Deadlock.to_nt_status() as u32,
            NtStatus::PossibleDeadlock as u32
        );
    }

    #[test]
    fn stale_handle_maps_across_protocols() {
        assert_eq!(Error::StaleHandle.to_nfs3() as u32, NfsStat3::Stale as u32);
        assert_eq!(Error::StaleHandle.to_nlm4() as u32, Nlm4Stat::StaleFh as u32);
    }

    #[test]
    fn queue_full_maps_to_nolocks_on_nlm() {
        assert_eq!(
            Error::QueueFull.to_nlm4() as u32,
            Nlm4Stat::DeniedNoLocks as u32
        );
    }
}
