//! NFS version 3 wire types as defined in RFC 1813.
//!
//! This module holds the basic data types shared by every procedure:
//! status codes, file attributes, handle and time structures, and the
//! weak cache consistency (WCC) building blocks. Operation-specific
//! argument/result structures live in the [`file`], [`dir`] and [`fs`]
//! submodules.

#![allow(non_camel_case_types)]

use std::fmt;
use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::*;

pub mod dir;
pub mod file;
pub mod fs;

/// NFS RPC program number.
pub const PROGRAM: u32 = 100003;
/// Protocol version of this module.
pub const VERSION: u32 = 3;

/// Maximum size of a version 3 file handle in bytes.
pub const NFS3_FHSIZE: usize = 64;
/// Size of the cookie verifier used by READDIR and READDIRPLUS.
pub const NFS3_COOKIEVERFSIZE: usize = 8;
/// Size of the verifier used for exclusive CREATE.
pub const NFS3_CREATEVERFSIZE: usize = 8;
/// Size of the verifier used for asynchronous WRITE.
pub const NFS3_WRITEVERFSIZE: usize = 8;

/// Byte string used for names and paths. NFS places no character set
/// restrictions on these, so they stay raw bytes end to end.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct nfsstring(pub Vec<u8>);

impl nfsstring {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for nfsstring {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for nfsstring {
    fn from(value: &[u8]) -> Self {
        Self(value.into())
    }
}

impl AsRef<[u8]> for nfsstring {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::ops::Deref for nfsstring {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for nfsstring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl Serialize for nfsstring {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.0.serialize(dest)
    }
}

impl Deserialize for nfsstring {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.0.deserialize(src)
    }
}

/// Name of a single directory component.
pub type filename3 = nfsstring;
/// Full path, used for symbolic link targets.
pub type nfspath3 = nfsstring;
/// File identifier, the equivalent of an inode number.
pub type fileid3 = u64;
/// Directory iteration position.
pub type cookie3 = u64;
/// Verifier detecting directory changes between readdir calls.
pub type cookieverf3 = [u8; NFS3_COOKIEVERFSIZE];
/// Verifier making exclusive CREATE retryable.
pub type createverf3 = [u8; NFS3_CREATEVERFSIZE];
/// Verifier detecting server restarts between WRITE and COMMIT.
pub type writeverf3 = [u8; NFS3_WRITEVERFSIZE];
pub type uid3 = u32;
pub type gid3 = u32;
pub type size3 = u64;
pub type offset3 = u64;
pub type mode3 = u32;
pub type count3 = u32;

/// Procedure numbers of the version 3 program.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum NfsProc3 {
    NFSPROC3_NULL = 0,
    NFSPROC3_GETATTR = 1,
    NFSPROC3_SETATTR = 2,
    NFSPROC3_LOOKUP = 3,
    NFSPROC3_ACCESS = 4,
    NFSPROC3_READLINK = 5,
    NFSPROC3_READ = 6,
    NFSPROC3_WRITE = 7,
    NFSPROC3_CREATE = 8,
    NFSPROC3_MKDIR = 9,
    NFSPROC3_SYMLINK = 10,
    NFSPROC3_MKNOD = 11,
    NFSPROC3_REMOVE = 12,
    NFSPROC3_RMDIR = 13,
    NFSPROC3_RENAME = 14,
    NFSPROC3_LINK = 15,
    NFSPROC3_READDIR = 16,
    NFSPROC3_READDIRPLUS = 17,
    NFSPROC3_FSSTAT = 18,
    NFSPROC3_FSINFO = 19,
    NFSPROC3_PATHCONF = 20,
    NFSPROC3_COMMIT = 21,
    INVALID = 22,
}

/// Status codes of version 3 procedures.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum nfsstat3 {
    /// The call completed successfully.
    #[default]
    NFS3_OK = 0,
    /// Caller is neither privileged nor the owner of the target.
    NFS3ERR_PERM = 1,
    /// The name or file handle target does not exist.
    NFS3ERR_NOENT = 2,
    /// Hard I/O error while processing the operation.
    NFS3ERR_IO = 5,
    /// No such device or address.
    NFS3ERR_NXIO = 6,
    /// Permission denied for reasons other than ownership.
    NFS3ERR_ACCES = 13,
    /// The target already exists.
    NFS3ERR_EXIST = 17,
    /// Attempted cross-device hard link.
    NFS3ERR_XDEV = 18,
    /// No such device.
    NFS3ERR_NODEV = 19,
    /// A non-directory was named in a directory operation.
    NFS3ERR_NOTDIR = 20,
    /// A directory was named in a non-directory operation.
    NFS3ERR_ISDIR = 21,
    /// Invalid or unsupported argument.
    NFS3ERR_INVAL = 22,
    /// The operation would grow a file beyond the server's limit.
    NFS3ERR_FBIG = 27,
    /// No space left on the underlying file system.
    NFS3ERR_NOSPC = 28,
    /// Modifying operation on a read-only file system.
    NFS3ERR_ROFS = 30,
    /// Too many hard links.
    NFS3ERR_MLINK = 31,
    /// Name component exceeded the server's limit.
    NFS3ERR_NAMETOOLONG = 63,
    /// Attempted to remove a non-empty directory.
    NFS3ERR_NOTEMPTY = 66,
    /// Quota exhausted.
    NFS3ERR_DQUOT = 69,
    /// The file handle no longer refers to a live object.
    NFS3ERR_STALE = 70,
    /// Handle refers to a non-local file system.
    NFS3ERR_REMOTE = 71,
    /// Handle failed internal consistency checks.
    NFS3ERR_BADHANDLE = 10001,
    /// SETATTR guard mismatch.
    NFS3ERR_NOT_SYNC = 10002,
    /// READDIR cookie no longer valid.
    NFS3ERR_BAD_COOKIE = 10003,
    /// Operation not supported by this server.
    NFS3ERR_NOTSUPP = 10004,
    /// Reply would not fit the caller's buffer limit.
    NFS3ERR_TOOSMALL = 10005,
    /// Server fault with no closer protocol mapping.
    NFS3ERR_SERVERFAULT = 10006,
    /// Object type not supported by the server.
    NFS3ERR_BADTYPE = 10007,
    /// Server is temporarily unable to complete the request; the
    /// client should retry later.
    NFS3ERR_JUKEBOX = 10008,
}
SerializeEnum!(nfsstat3);
DeserializeEnum!(nfsstat3);

/// File object types.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ftype3 {
    #[default]
    NF3REG = 1,
    NF3DIR = 2,
    NF3BLK = 3,
    NF3CHR = 4,
    NF3LNK = 5,
    NF3SOCK = 6,
    NF3FIFO = 7,
}
SerializeEnum!(ftype3);
DeserializeEnum!(ftype3);

/// Major/minor numbers for device special files.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct specdata3 {
    pub specdata1: u32,
    pub specdata2: u32,
}
SerializeStruct!(specdata3, specdata1, specdata2);
DeserializeStruct!(specdata3, specdata1, specdata2);

/// Opaque version 3 file handle, up to [`NFS3_FHSIZE`] bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct nfs_fh3 {
    pub data: Vec<u8>,
}
SerializeStruct!(nfs_fh3, data);
DeserializeStruct!(nfs_fh3, data);

/// Second/nanosecond timestamp.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct nfstime3 {
    pub seconds: u32,
    pub nseconds: u32,
}
SerializeStruct!(nfstime3, seconds, nseconds);
DeserializeStruct!(nfstime3, seconds, nseconds);

impl From<nfstime3> for filetime::FileTime {
    fn from(time: nfstime3) -> Self {
        filetime::FileTime::from_unix_time(time.seconds as i64, time.nseconds)
    }
}

/// Complete file attributes.
#[derive(Copy, Clone, Debug, Default)]
pub struct fattr3 {
    pub ftype: ftype3,
    pub mode: mode3,
    pub nlink: u32,
    pub uid: uid3,
    pub gid: gid3,
    pub size: size3,
    pub used: size3,
    pub rdev: specdata3,
    pub fsid: u64,
    pub fileid: fileid3,
    pub atime: nfstime3,
    pub mtime: nfstime3,
    pub ctime: nfstime3,
}
SerializeStruct!(
    fattr3, ftype, mode, nlink, uid, gid, size, used, rdev, fsid, fileid, atime, mtime, ctime
);
DeserializeStruct!(
    fattr3, ftype, mode, nlink, uid, gid, size, used, rdev, fsid, fileid, atime, mtime, ctime
);

/// Subset of attributes sampled before a mutating operation.
#[derive(Copy, Clone, Debug, Default)]
pub struct wcc_attr {
    pub size: size3,
    pub mtime: nfstime3,
    pub ctime: nfstime3,
}
SerializeStruct!(wcc_attr, size, mtime, ctime);
DeserializeStruct!(wcc_attr, size, mtime, ctime);

impl From<fattr3> for wcc_attr {
    fn from(attr: fattr3) -> wcc_attr {
        wcc_attr { size: attr.size, mtime: attr.mtime, ctime: attr.ctime }
    }
}

/// Optional pre-operation attributes.
pub type pre_op_attr = Option<wcc_attr>;
/// Optional post-operation attributes, present in almost every reply.
pub type post_op_attr = Option<fattr3>;
/// Optional file handle returned by CREATE-family procedures.
pub type post_op_fh3 = Option<nfs_fh3>;

/// Weak cache consistency data: attributes straddling a mutation so the
/// client can detect updates it missed.
#[derive(Copy, Clone, Debug, Default)]
pub struct wcc_data {
    pub before: pre_op_attr,
    pub after: post_op_attr,
}
SerializeStruct!(wcc_data, before, after);
DeserializeStruct!(wcc_data, before, after);

/// How SETATTR should derive the new atime/mtime.
#[derive(Copy, Clone, Debug, Default)]
pub enum set_time3 {
    #[default]
    DONT_CHANGE,
    SET_TO_SERVER_TIME,
    SET_TO_CLIENT_TIME(nfstime3),
}

impl Serialize for set_time3 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            set_time3::DONT_CHANGE => 0_u32.serialize(dest),
            set_time3::SET_TO_SERVER_TIME => 1_u32.serialize(dest),
            set_time3::SET_TO_CLIENT_TIME(v) => {
                2_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for set_time3 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32>(src)? {
            0 => *self = set_time3::DONT_CHANGE,
            1 => *self = set_time3::SET_TO_SERVER_TIME,
            2 => *self = set_time3::SET_TO_CLIENT_TIME(deserialize(src)?),
            c => return Err(invalid_data(format!("invalid time_how {c}"))),
        }
        Ok(())
    }
}

/// Attributes a client may change with SETATTR or supply at creation.
#[derive(Copy, Clone, Debug, Default)]
pub struct sattr3 {
    pub mode: Option<mode3>,
    pub uid: Option<uid3>,
    pub gid: Option<gid3>,
    pub size: Option<size3>,
    pub atime: set_time3,
    pub mtime: set_time3,
}
SerializeStruct!(sattr3, mode, uid, gid, size, atime, mtime);
DeserializeStruct!(sattr3, mode, uid, gid, size, atime, mtime);

/// Directory handle plus name, the argument shape shared by LOOKUP,
/// REMOVE, RMDIR and the creation procedures.
#[derive(Clone, Debug, Default)]
pub struct diropargs3 {
    pub dir: nfs_fh3,
    pub name: filename3,
}
SerializeStruct!(diropargs3, dir, name);
DeserializeStruct!(diropargs3, dir, name);
