//! Protocol-agnostic data model shared by every component (spec.md §3).

use std::path::PathBuf;

/// Opaque identifier stable for the life of the file, comparable for
/// equality across all protocols. Size must stay at or below 128 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHandle(pub Vec<u8>);

impl FileHandle {
    pub const MAX_LEN: usize = 128;

    pub fn new(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.len() <= Self::MAX_LEN);
        Self(bytes)
    }
}

/// POSIX-ish file type, covering every type NFSv3/v4 and SMB need to
/// distinguish.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Socket,
    Fifo,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

/// A single access-control entry, in the NFSv4 ACE shape (mask bits map
/// 1:1 to Windows `ACCESS_MASK`, spec.md §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    pub who: Principal,
    pub allow: bool,
    pub mask: u32,
    pub flags: u32,
}

/// Either a concrete uid/gid or a well-known principal (`EVERYONE@`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    User(u32),
    Group(u32),
    Everyone,
    Owner,
    OwnerGroup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl(pub Vec<AclEntry>);

/// `FileAttr` tuple (spec.md §3). `acl == None` means permission
/// evaluation falls back to Unix mode; externally reported `nlink` is
/// always `max(nlink, 1)` via [`FileAttr::reported_nlink`].
#[derive(Debug, Clone, PartialEq)]
pub struct FileAttr {
    pub file_type: FileType,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub size: u64,
    pub mtime: Timestamp,
    pub atime: Timestamp,
    pub ctime: Timestamp,
    pub btime: Timestamp,
    pub acl: Option<Acl>,
}

impl FileAttr {
    /// `nlink` reported externally is `max(nlink, 1)` (spec.md §3).
    pub fn reported_nlink(&self) -> u32 {
        self.nlink.max(1)
    }
}

/// A node's logical path, tracked so directory renames can update every
/// descendant in one transaction (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsPath(pub PathBuf);

/// Protocol tag carried by [`crate::identity::RequestContext`] and by
/// [`crate::lock::LockOwner`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Protocol {
    Nfs3,
    Nfs4,
    Smb,
}
