//! NFS version 2 wire types as defined in RFC 1094.
//!
//! Version 2 predates 64-bit file semantics: handles are exactly 32 bytes,
//! offsets and sizes are 32-bit, and READ/WRITE transfers are capped at
//! 8 KiB.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::*;

/// NFS RPC program number (shared by all protocol versions).
pub const PROGRAM: u32 = 100003;
/// Protocol version of this module.
pub const VERSION: u32 = 2;

/// Fixed size of an NFSv2 file handle.
pub const NFS2_FHSIZE: usize = 32;
/// Maximum payload of a single READ or WRITE.
pub const NFS2_MAXDATA: u32 = 8192;
/// Maximum length of a path argument.
pub const NFS2_MAXPATHLEN: usize = 1024;
/// Maximum length of a single name component.
pub const NFS2_MAXNAMLEN: usize = 255;
/// Size of the opaque readdir cookie.
pub const NFS2_COOKIESIZE: usize = 4;

/// Procedure numbers of the version 2 program.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum NfsProc2 {
    NFSPROC_NULL = 0,
    NFSPROC_GETATTR = 1,
    NFSPROC_SETATTR = 2,
    NFSPROC_ROOT = 3,
    NFSPROC_LOOKUP = 4,
    NFSPROC_READLINK = 5,
    NFSPROC_READ = 6,
    NFSPROC_WRITECACHE = 7,
    NFSPROC_WRITE = 8,
    NFSPROC_CREATE = 9,
    NFSPROC_REMOVE = 10,
    NFSPROC_RENAME = 11,
    NFSPROC_LINK = 12,
    NFSPROC_SYMLINK = 13,
    NFSPROC_MKDIR = 14,
    NFSPROC_RMDIR = 15,
    NFSPROC_READDIR = 16,
    NFSPROC_STATFS = 17,
    INVALID = 18,
}

/// Status codes of version 2 procedures.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum nfsstat2 {
    #[default]
    NFS_OK = 0,
    NFSERR_PERM = 1,
    NFSERR_NOENT = 2,
    NFSERR_IO = 5,
    NFSERR_NXIO = 6,
    NFSERR_ACCES = 13,
    NFSERR_EXIST = 17,
    NFSERR_NODEV = 19,
    NFSERR_NOTDIR = 20,
    NFSERR_ISDIR = 21,
    NFSERR_FBIG = 27,
    NFSERR_NOSPC = 28,
    NFSERR_ROFS = 30,
    NFSERR_NAMETOOLONG = 63,
    NFSERR_NOTEMPTY = 66,
    NFSERR_DQUOT = 69,
    NFSERR_STALE = 70,
    NFSERR_WFLUSH = 99,
}
SerializeEnum!(nfsstat2);
DeserializeEnum!(nfsstat2);

/// File types; NFNON covers everything version 2 cannot express.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ftype2 {
    #[default]
    NFNON = 0,
    NFREG = 1,
    NFDIR = 2,
    NFBLK = 3,
    NFCHR = 4,
    NFLNK = 5,
}
SerializeEnum!(ftype2);
DeserializeEnum!(ftype2);

/// The fixed 32 byte version 2 file handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct fhandle2 {
    pub data: [u8; NFS2_FHSIZE],
}

impl Default for fhandle2 {
    fn default() -> fhandle2 {
        fhandle2 { data: [0; NFS2_FHSIZE] }
    }
}
SerializeStruct!(fhandle2, data);
DeserializeStruct!(fhandle2, data);

/// Second/microsecond timestamp used throughout version 2.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct timeval2 {
    pub seconds: u32,
    pub useconds: u32,
}
SerializeStruct!(timeval2, seconds, useconds);
DeserializeStruct!(timeval2, seconds, useconds);

/// Complete file attributes returned by most procedures.
#[derive(Copy, Clone, Debug, Default)]
pub struct fattr2 {
    pub ftype: ftype2,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub blocksize: u32,
    pub rdev: u32,
    pub blocks: u32,
    pub fsid: u32,
    pub fileid: u32,
    pub atime: timeval2,
    pub mtime: timeval2,
    pub ctime: timeval2,
}
SerializeStruct!(
    fattr2, ftype, mode, nlink, uid, gid, size, blocksize, rdev, blocks, fsid, fileid, atime,
    mtime, ctime
);
DeserializeStruct!(
    fattr2, ftype, mode, nlink, uid, gid, size, blocksize, rdev, blocks, fsid, fileid, atime,
    mtime, ctime
);

/// Settable attributes; the all-ones value means "do not change".
#[derive(Copy, Clone, Debug)]
pub struct sattr2 {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub atime: timeval2,
    pub mtime: timeval2,
}

impl Default for sattr2 {
    fn default() -> sattr2 {
        sattr2 {
            mode: u32::MAX,
            uid: u32::MAX,
            gid: u32::MAX,
            size: u32::MAX,
            atime: timeval2 { seconds: u32::MAX, useconds: u32::MAX },
            mtime: timeval2 { seconds: u32::MAX, useconds: u32::MAX },
        }
    }
}
SerializeStruct!(sattr2, mode, uid, gid, size, atime, mtime);
DeserializeStruct!(sattr2, mode, uid, gid, size, atime, mtime);

/// Directory handle plus name, the argument shape of LOOKUP and friends.
#[derive(Clone, Debug, Default)]
pub struct diropargs2 {
    pub dir: fhandle2,
    pub name: Vec<u8>,
}
SerializeStruct!(diropargs2, dir, name);
DeserializeStruct!(diropargs2, dir, name);

/// Success body of LOOKUP/CREATE/MKDIR: new handle plus attributes.
#[derive(Clone, Debug, Default)]
pub struct diropok2 {
    pub file: fhandle2,
    pub attributes: fattr2,
}
SerializeStruct!(diropok2, file, attributes);
DeserializeStruct!(diropok2, file, attributes);

/// READ arguments. `totalcount` is unused by the protocol.
#[derive(Clone, Debug, Default)]
pub struct readargs2 {
    pub file: fhandle2,
    pub offset: u32,
    pub count: u32,
    pub totalcount: u32,
}
SerializeStruct!(readargs2, file, offset, count, totalcount);
DeserializeStruct!(readargs2, file, offset, count, totalcount);

/// WRITE arguments. `beginoffset` and `totalcount` are unused by the
/// protocol.
#[derive(Clone, Debug, Default)]
pub struct writeargs2 {
    pub file: fhandle2,
    pub beginoffset: u32,
    pub offset: u32,
    pub totalcount: u32,
    pub data: Vec<u8>,
}
SerializeStruct!(writeargs2, file, beginoffset, offset, totalcount, data);
DeserializeStruct!(writeargs2, file, beginoffset, offset, totalcount, data);

/// CREATE/MKDIR arguments.
#[derive(Clone, Debug, Default)]
pub struct createargs2 {
    pub r#where: diropargs2,
    pub attributes: sattr2,
}

impl Serialize for createargs2 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.r#where.serialize(dest)?;
        self.attributes.serialize(dest)
    }
}

impl Deserialize for createargs2 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.r#where.deserialize(src)?;
        self.attributes.deserialize(src)
    }
}

/// RENAME arguments.
#[derive(Clone, Debug, Default)]
pub struct renameargs2 {
    pub from: diropargs2,
    pub to: diropargs2,
}
SerializeStruct!(renameargs2, from, to);
DeserializeStruct!(renameargs2, from, to);

/// LINK arguments.
#[derive(Clone, Debug, Default)]
pub struct linkargs2 {
    pub from: fhandle2,
    pub to: diropargs2,
}
SerializeStruct!(linkargs2, from, to);
DeserializeStruct!(linkargs2, from, to);

/// SYMLINK arguments.
#[derive(Clone, Debug, Default)]
pub struct symlinkargs2 {
    pub from: diropargs2,
    pub to: Vec<u8>,
    pub attributes: sattr2,
}
SerializeStruct!(symlinkargs2, from, to, attributes);
DeserializeStruct!(symlinkargs2, from, to, attributes);

/// READDIR arguments; the cookie is an opaque 4 byte iteration marker.
#[derive(Clone, Debug, Default)]
pub struct readdirargs2 {
    pub dir: fhandle2,
    pub cookie: [u8; NFS2_COOKIESIZE],
    pub count: u32,
}
SerializeStruct!(readdirargs2, dir, cookie, count);
DeserializeStruct!(readdirargs2, dir, cookie, count);

/// One READDIR entry; the reply chains entries with the XDR list
/// convention and terminates with an EOF flag.
#[derive(Clone, Debug, Default)]
pub struct entry2 {
    pub fileid: u32,
    pub name: Vec<u8>,
    pub cookie: [u8; NFS2_COOKIESIZE],
}
SerializeStruct!(entry2, fileid, name, cookie);
DeserializeStruct!(entry2, fileid, name, cookie);

/// Success body of STATFS.
#[derive(Copy, Clone, Debug, Default)]
pub struct statfsok2 {
    pub tsize: u32,
    pub bsize: u32,
    pub blocks: u32,
    pub bfree: u32,
    pub bavail: u32,
}
SerializeStruct!(statfsok2, tsize, bsize, blocks, bfree, bavail);
DeserializeStruct!(statfsok2, tsize, bsize, blocks, bfree, bavail);
