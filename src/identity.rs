//! Request identity and permission evaluation (spec.md §4.5, §3).
//!
//! Every operation carries a [`RequestContext`] naming the caller and the
//! protocol it arrived over. [`evaluate_access`] is the single place that
//! turns a `FileAttr`'s mode bits or ACL into an allow/deny decision —
//! callers never inspect `mode`/`acl` directly.

use crate::model::{Acl, AclEntry, FileAttr, Principal, Protocol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessMask(pub u32);

impl AccessMask {
    pub const READ: AccessMask = AccessMask(0x0000_0001);
    pub const WRITE: AccessMask = AccessMask(0x0000_0002);
    pub const EXECUTE: AccessMask = AccessMask(0x0000_0004);
    pub const DELETE: AccessMask = AccessMask(0x0000_0008);
}

/// The caller a request is evaluated on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub uid: u32,
    pub gids: Vec<u32>,
    pub protocol: Protocol,
    /// Unix root and the SMB well-known Administrator SID both bypass
    /// discretionary checks; resolved once at identity-mapping time
    /// rather than re-derived from `uid == 0` at every call site.
    pub is_superuser: bool,
}

impl RequestContext {
    pub fn is_member_of(&self, gid: u32) -> bool {
        self.gids.contains(&gid)
    }
}

/// Evaluates whether `ctx` may perform `wanted` on a file with attributes
/// `attr`. An ACL, when present, wins outright over the Unix mode bits
/// (spec.md §4.5); root/Administrator bypasses both.
pub fn evaluate_access(ctx: &RequestContext, attr: &FileAttr, wanted: AccessMask) -> bool {
    if ctx.is_superuser {
        return true;
    }
    match &attr.acl {
        Some(acl) => evaluate_acl(ctx, attr, acl, wanted),
        None => evaluate_mode(ctx, attr, wanted),
    }
}

fn evaluate_mode(ctx: &RequestContext, attr: &FileAttr, wanted: AccessMask) -> bool {
    let shift = if ctx.uid == attr.uid {
        6
    } else if ctx.is_member_of(attr.gid) {
        3
    } else {
        0
    };
    let bits = (attr.mode >> shift) & 0o7;
    let needed = mode_bits_for(wanted);
    bits & needed == needed
}

fn mode_bits_for(wanted: AccessMask) -> u32 {
    let mut bits = 0;
    if wanted.0 & AccessMask::READ.0 != 0 {
        bits |= 0o4;
    }
    if wanted.0 & AccessMask::WRITE.0 != 0 {
        bits |= 0o2;
    }
    if wanted.0 & AccessMask::EXECUTE.0 != 0 {
        bits |= 0o1;
    }
    bits
}

/// Walks the ACL in order (NFSv4/Windows semantics): the first entry that
/// matches the principal and covers any bit of `wanted` decides that bit,
/// whether ALLOW or DENY; unmatched bits fall through to later entries.
fn evaluate_acl(ctx: &RequestContext, attr: &FileAttr, acl: &Acl, wanted: AccessMask) -> bool {
    let mut remaining = wanted.0;
    let mut denied = false;
    for entry in &acl.0 {
        if remaining == 0 {
            break;
        }
        if !principal_matches(ctx, attr, &entry.who) {
            continue;
        }
        let hit = entry.mask & remaining;
        if hit == 0 {
            continue;
        }
        if !entry.allow {
            denied = true;
            break;
        }
        remaining &= !hit;
    }
    !denied && remaining == 0
}

fn principal_matches(ctx: &RequestContext, attr: &FileAttr, who: &Principal) -> bool {
    match who {
        Principal::User(uid) => ctx.uid == *uid,
        Principal::Group(gid) => ctx.is_member_of(*gid),
        Principal::Everyone => true,
        Principal::Owner => ctx.uid == attr.uid,
        Principal::OwnerGroup => ctx.is_member_of(attr.gid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileType, Timestamp};

    fn attr(mode: u32, uid: u32, gid: u32, acl: Option<Acl>) -> FileAttr {
        FileAttr {
            file_type: FileType::Regular,
            mode,
            uid,
            gid,
            nlink: 1,
            size: 0,
            mtime: Timestamp::default(),
            atime: Timestamp::default(),
            ctime: Timestamp::default(),
            btime: Timestamp::default(),
            acl,
        }
    }

    fn ctx(uid: u32, gids: Vec<u32>) -> RequestContext {
        RequestContext {
            uid,
            gids,
            protocol: Protocol::Nfs3,
            is_superuser: false,
        }
    }

    #[test]
    fn owner_read_allowed_by_mode() {
        let a = attr(0o640, 100, 200, None);
        assert!(evaluate_access(&ctx(100, vec![]), &a, AccessMask::READ));
    }

    #[test]
    fn other_write_denied_by_mode() {
        let a = attr(0o640, 100, 200, None);
        assert!(!evaluate_access(&ctx(999, vec![]), &a, AccessMask::WRITE));
    }

    #[test]
    fn group_member_read_allowed_by_mode() {
        let a = attr(0o640, 100, 200, None);
        assert!(evaluate_access(&ctx(101, vec![200]), &a, AccessMask::READ));
    }

    #[test]
    fn superuser_bypasses_mode_and_acl() {
        let a = attr(0o000, 100, 200, None);
        let su = RequestContext {
            uid: 0,
            gids: vec![],
            protocol: Protocol::Nfs3,
            is_superuser: true,
        };
        assert!(evaluate_access(&su, &a, AccessMask::WRITE));
    }

    #[test]
    fn acl_deny_entry_wins_over_later_allow() {
        let acl = Acl(vec![
            AclEntry {
                who: Principal::User(100),
                allow: false,
                mask: AccessMask::WRITE.0,
                flags: 0,
            },
            AclEntry {
                who: Principal::Everyone,
                allow: true,
                mask: AccessMask::WRITE.0,
                flags: 0,
            },
        ]);
        let a = attr(0o666, 100, 200, Some(acl));
        assert!(!evaluate_access(&ctx(100, vec![]), &a, AccessMask::WRITE));
    }

    #[test]
    fn acl_present_overrides_permissive_mode_bits() {
        let acl = Acl(vec![AclEntry {
            who: Principal::Everyone,
            allow: false,
            mask: AccessMask::WRITE.0,
            flags: 0,
        }]);
        let a = attr(0o666, 100, 200, Some(acl));
        assert!(!evaluate_access(&ctx(999, vec![]), &a, AccessMask::WRITE));
    }
}
