//! Security-descriptor and SID translation bridge (spec.md §4.7).

use crate::model::{Acl, AclEntry, Principal};

/// Local users/groups are represented as `S-1-5-21-0-0-0-{id}`; the
/// trailing zero authority sub-values are this server's synthetic
/// domain and are not meaningful beyond round-tripping (spec.md §4.7).
pub fn sid_for_user(uid: u32) -> String {
    format!("S-1-5-21-0-0-0-{uid}")
}

pub fn sid_for_group(gid: u32) -> String {
    format!("S-1-5-21-0-0-0-{gid}")
}

/// Bidirectional well-known SID mapping (spec.md §4.7).
pub fn principal_to_sid(p: &Principal) -> String {
    match p {
        Principal::Everyone => "S-1-1-0".to_string(),
        Principal::Owner => "S-1-3-0".to_string(),
        Principal::OwnerGroup => "S-1-3-1".to_string(),
        Principal::User(uid) => sid_for_user(*uid),
        Principal::Group(gid) => sid_for_group(*gid),
    }
}

pub fn sid_to_principal(sid: &str) -> Option<Principal> {
    match sid {
        "S-1-1-0" => Some(Principal::Everyone),
        "S-1-3-0" => Some(Principal::Owner),
        "S-1-3-1" => Some(Principal::OwnerGroup),
        _ => {
            let id: u32 = sid.strip_prefix("S-1-5-21-0-0-0-")?.parse().ok()?;
            Some(Principal::User(id))
        }
    }
}

/// `FileStandardInfo.NumberOfLinks` is always `max(nlink, 1)` (spec.md
/// §4.7, and the identical invariant on [`crate::model::FileAttr`]).
pub fn number_of_links(nlink: u32) -> u32 {
    nlink.max(1)
}

/// A minimal self-relative security descriptor: owner/group SIDs plus a
/// DACL translated 1:1 from the NFSv4 ACL (identical `ACCESS_MASK` bit
/// positions, spec.md §4.7). Real MS-SMB2 wire encoding (4-byte-aligned
/// offsets into a single buffer) is left to the adapter that actually
/// serialises this onto the wire.
#[derive(Debug, Clone)]
pub struct SecurityDescriptor {
    pub owner_sid: String,
    pub group_sid: String,
    pub dacl: Vec<AceOut>,
}

#[derive(Debug, Clone)]
pub struct AceOut {
    pub sid: String,
    pub allow: bool,
    pub mask: u32,
}

pub fn acl_to_security_descriptor(owner_uid: u32, owner_gid: u32, acl: &Acl) -> SecurityDescriptor {
    SecurityDescriptor {
        owner_sid: sid_for_user(owner_uid),
        group_sid: sid_for_group(owner_gid),
        dacl: acl
            .0
            .iter()
            .map(|e: &AclEntry| AceOut {
                sid: principal_to_sid(&e.who),
                allow: e.allow,
                mask: e.mask,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_sid_round_trips_both_directions() {
        assert_eq!(principal_to_sid(&Principal::Everyone), "S-1-1-0");
        assert_eq!(sid_to_principal("S-1-1-0"), Some(Principal::Everyone));
        assert_eq!(principal_to_sid(&Principal::Owner), "S-1-3-0");
        assert_eq!(sid_to_principal("S-1-3-0"), Some(Principal::Owner));
        assert_eq!(principal_to_sid(&Principal::OwnerGroup), "S-1-3-1");
        assert_eq!(sid_to_principal("S-1-3-1"), Some(Principal::OwnerGroup));
    }

    #[test]
    fn local_user_sid_round_trips() {
        let sid = sid_for_user(1001);
        assert_eq!(sid, "S-1-5-21-0-0-0-1001");
        assert_eq!(sid_to_principal(&sid), Some(Principal::User(1001)));
    }

    #[test]
    fn number_of_links_floors_at_one() {
        assert_eq!(number_of_links(0), 1);
        assert_eq!(number_of_links(3), 3);
    }
}
