//! NFS version 4 wire types: status codes, operation numbers, state
//! identifiers and the session structures (RFC 7530, with the session
//! operations of RFC 5661 folded into the same operation table).
//!
//! Unlike versions 2 and 3 there is no per-procedure argument catalogue
//! here: COMPOUND operations are decoded field by field inside the
//! operation handlers, so this module only carries the shared shapes.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::*;

/// NFS RPC program number.
pub const PROGRAM: u32 = 100003;
/// Protocol version of this module.
pub const VERSION: u32 = 4;

/// Top-level procedure numbers. Everything besides NULL is a COMPOUND.
pub const NFSPROC4_NULL: u32 = 0;
pub const NFSPROC4_COMPOUND: u32 = 1;

/// Maximum size of a version 4 file handle in bytes.
pub const NFS4_FHSIZE: usize = 128;
/// Size of a session identifier.
pub const NFS4_SESSIONID_SIZE: usize = 16;
/// Size of a verifier.
pub const NFS4_VERIFIER_SIZE: usize = 8;
/// Size of the non-seqid portion of a stateid.
pub const NFS4_OTHER_SIZE: usize = 12;

pub type verifier4 = [u8; NFS4_VERIFIER_SIZE];
pub type sessionid4 = [u8; NFS4_SESSIONID_SIZE];
pub type bitmap4 = Vec<u32>;

/// Status codes used by this server's operation set.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum nfsstat4 {
    #[default]
    NFS4_OK = 0,
    NFS4ERR_PERM = 1,
    NFS4ERR_NOENT = 2,
    NFS4ERR_IO = 5,
    NFS4ERR_NXIO = 6,
    NFS4ERR_ACCESS = 13,
    NFS4ERR_EXIST = 17,
    NFS4ERR_XDEV = 18,
    NFS4ERR_NOTDIR = 20,
    NFS4ERR_ISDIR = 21,
    NFS4ERR_INVAL = 22,
    NFS4ERR_FBIG = 27,
    NFS4ERR_NOSPC = 28,
    NFS4ERR_ROFS = 30,
    NFS4ERR_MLINK = 31,
    NFS4ERR_NAMETOOLONG = 63,
    NFS4ERR_NOTEMPTY = 66,
    NFS4ERR_DQUOT = 69,
    NFS4ERR_STALE = 70,
    NFS4ERR_BADHANDLE = 10001,
    NFS4ERR_BAD_COOKIE = 10003,
    NFS4ERR_NOTSUPP = 10004,
    NFS4ERR_TOOSMALL = 10005,
    NFS4ERR_SERVERFAULT = 10006,
    NFS4ERR_BADTYPE = 10007,
    NFS4ERR_DELAY = 10008,
    NFS4ERR_SAME = 10009,
    NFS4ERR_DENIED = 10010,
    NFS4ERR_EXPIRED = 10011,
    NFS4ERR_LOCKED = 10012,
    NFS4ERR_GRACE = 10013,
    NFS4ERR_FHEXPIRED = 10014,
    NFS4ERR_SHARE_DENIED = 10015,
    NFS4ERR_WRONGSEC = 10016,
    NFS4ERR_CLID_INUSE = 10017,
    NFS4ERR_RESOURCE = 10018,
    NFS4ERR_NOFILEHANDLE = 10020,
    NFS4ERR_MINOR_VERS_MISMATCH = 10021,
    NFS4ERR_STALE_CLIENTID = 10022,
    NFS4ERR_STALE_STATEID = 10023,
    NFS4ERR_OLD_STATEID = 10024,
    NFS4ERR_BAD_STATEID = 10025,
    NFS4ERR_BAD_SEQID = 10026,
    NFS4ERR_LOCK_RANGE = 10028,
    NFS4ERR_SYMLINK = 10029,
    NFS4ERR_RESTOREFH = 10030,
    NFS4ERR_ATTRNOTSUPP = 10032,
    NFS4ERR_NO_GRACE = 10033,
    NFS4ERR_BADCHAR = 10040,
    NFS4ERR_BADNAME = 10041,
    NFS4ERR_BAD_RANGE = 10042,
    NFS4ERR_LOCK_NOTSUPP = 10043,
    NFS4ERR_OP_ILLEGAL = 10044,
    NFS4ERR_DEADLOCK = 10045,
    NFS4ERR_FILE_OPEN = 10046,
    NFS4ERR_ADMIN_REVOKED = 10047,
    NFS4ERR_BADSESSION = 10052,
    NFS4ERR_BADSLOT = 10053,
    NFS4ERR_SEQ_MISORDERED = 10063,
    NFS4ERR_SEQUENCE_POS = 10064,
    NFS4ERR_OP_NOT_IN_SESSION = 10071,
}
SerializeEnum!(nfsstat4);
DeserializeEnum!(nfsstat4);

/// COMPOUND operation numbers dispatched by the second-level table.
/// 59/60 are this server's ACL operations, placed just past the last
/// RFC-assigned number it implements.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum NfsOp4 {
    OP_ACCESS = 3,
    OP_CLOSE = 4,
    OP_COMMIT = 5,
    OP_CREATE = 6,
    OP_DELEGPURGE = 7,
    OP_DELEGRETURN = 8,
    OP_GETATTR = 9,
    OP_GETFH = 10,
    OP_LINK = 11,
    OP_LOCK = 12,
    OP_LOCKT = 13,
    OP_LOCKU = 14,
    OP_LOOKUP = 15,
    OP_LOOKUPP = 16,
    OP_NVERIFY = 17,
    OP_OPEN = 18,
    OP_OPENATTR = 19,
    OP_OPEN_CONFIRM = 20,
    OP_OPEN_DOWNGRADE = 21,
    OP_PUTFH = 22,
    OP_PUTPUBFH = 23,
    OP_PUTROOTFH = 24,
    OP_READ = 25,
    OP_READDIR = 26,
    OP_READLINK = 27,
    OP_REMOVE = 28,
    OP_RENAME = 29,
    OP_RENEW = 30,
    OP_RESTOREFH = 31,
    OP_SAVEFH = 32,
    OP_SECINFO = 33,
    OP_SETATTR = 34,
    OP_SETCLIENTID = 35,
    OP_SETCLIENTID_CONFIRM = 36,
    OP_VERIFY = 37,
    OP_WRITE = 38,
    OP_RELEASE_LOCKOWNER = 39,
    OP_EXCHANGE_ID = 42,
    OP_CREATE_SESSION = 43,
    OP_DESTROY_SESSION = 44,
    OP_GETDEVICEINFO = 47,
    OP_SEQUENCE = 53,
    OP_DESTROY_CLIENTID = 57,
    OP_RECLAIM_COMPLETE = 58,
    OP_GETACL = 59,
    OP_SETACL = 60,
    OP_ILLEGAL = 10044,
}

/// 128-bit identifier naming open or lock state on a file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct stateid4 {
    pub seqid: u32,
    pub other: [u8; NFS4_OTHER_SIZE],
}
SerializeStruct!(stateid4, seqid, other);
DeserializeStruct!(stateid4, seqid, other);

impl stateid4 {
    /// The anonymous stateid (all zero) clients use for stateless I/O.
    pub fn is_anonymous(&self) -> bool {
        self.seqid == 0 && self.other == [0; NFS4_OTHER_SIZE]
    }

    /// The READ-bypass stateid (all ones).
    pub fn is_bypass(&self) -> bool {
        self.seqid == u32::MAX && self.other == [0xff; NFS4_OTHER_SIZE]
    }
}

/// Directory change information attached to namespace mutations.
#[derive(Copy, Clone, Debug, Default)]
pub struct change_info4 {
    pub atomic: bool,
    pub before: u64,
    pub after: u64,
}
SerializeStruct!(change_info4, atomic, before, after);
DeserializeStruct!(change_info4, atomic, before, after);

/// Attribute numbers this server understands.
pub const FATTR4_SUPPORTED_ATTRS: u32 = 0;
pub const FATTR4_TYPE: u32 = 1;
pub const FATTR4_FH_EXPIRE_TYPE: u32 = 2;
pub const FATTR4_CHANGE: u32 = 3;
pub const FATTR4_SIZE: u32 = 4;
pub const FATTR4_LINK_SUPPORT: u32 = 5;
pub const FATTR4_SYMLINK_SUPPORT: u32 = 6;
pub const FATTR4_NAMED_ATTR: u32 = 7;
pub const FATTR4_FSID: u32 = 8;
pub const FATTR4_UNIQUE_HANDLES: u32 = 9;
pub const FATTR4_LEASE_TIME: u32 = 10;
pub const FATTR4_RDATTR_ERROR: u32 = 11;
pub const FATTR4_FILEHANDLE: u32 = 19;
pub const FATTR4_FILEID: u32 = 20;
pub const FATTR4_MODE: u32 = 33;
pub const FATTR4_NUMLINKS: u32 = 35;
pub const FATTR4_OWNER: u32 = 36;
pub const FATTR4_OWNER_GROUP: u32 = 37;
pub const FATTR4_SPACE_USED: u32 = 45;
pub const FATTR4_TIME_ACCESS: u32 = 47;
pub const FATTR4_TIME_METADATA: u32 = 52;
pub const FATTR4_TIME_MODIFY: u32 = 53;

/// File types carried in the `type` attribute.
pub const NF4REG: u32 = 1;
pub const NF4DIR: u32 = 2;
pub const NF4BLK: u32 = 3;
pub const NF4CHR: u32 = 4;
pub const NF4LNK: u32 = 5;
pub const NF4SOCK: u32 = 6;
pub const NF4FIFO: u32 = 7;

/// Attribute mask plus packed attribute values.
#[derive(Clone, Debug, Default)]
pub struct fattr4 {
    pub attrmask: bitmap4,
    pub attr_vals: Vec<u8>,
}
SerializeStruct!(fattr4, attrmask, attr_vals);
DeserializeStruct!(fattr4, attrmask, attr_vals);

/// Returns whether attribute `attr` is set in `mask`.
pub fn bitmap_get(mask: &bitmap4, attr: u32) -> bool {
    let word = (attr / 32) as usize;
    word < mask.len() && mask[word] & (1 << (attr % 32)) != 0
}

/// Sets attribute `attr` in `mask`, growing it as needed.
pub fn bitmap_set(mask: &mut bitmap4, attr: u32) {
    let word = (attr / 32) as usize;
    if mask.len() <= word {
        mask.resize(word + 1, 0);
    }
    mask[word] |= 1 << (attr % 32);
}

/// OPEN share access: caller intends to read.
pub const OPEN4_SHARE_ACCESS_READ: u32 = 0x1;
/// OPEN share access: caller intends to write.
pub const OPEN4_SHARE_ACCESS_WRITE: u32 = 0x2;
/// OPEN share access: caller intends both.
pub const OPEN4_SHARE_ACCESS_BOTH: u32 = 0x3;

/// OPEN share deny values.
pub const OPEN4_SHARE_DENY_NONE: u32 = 0x0;
pub const OPEN4_SHARE_DENY_READ: u32 = 0x1;
pub const OPEN4_SHARE_DENY_WRITE: u32 = 0x2;
pub const OPEN4_SHARE_DENY_BOTH: u32 = 0x3;

/// OPEN result flag: the client must confirm the open. Never set here.
pub const OPEN4_RESULT_CONFIRM: u32 = 0x2;
/// OPEN result flag: the server supports locking on this file.
pub const OPEN4_RESULT_LOCKTYPE_POSIX: u32 = 0x4;

/// ACCESS operation permission bits.
pub const ACCESS4_READ: u32 = 0x01;
pub const ACCESS4_LOOKUP: u32 = 0x02;
pub const ACCESS4_MODIFY: u32 = 0x04;
pub const ACCESS4_EXTEND: u32 = 0x08;
pub const ACCESS4_DELETE: u32 = 0x10;
pub const ACCESS4_EXECUTE: u32 = 0x20;

/// Byte-range lock types.
pub const READ_LT: u32 = 1;
pub const WRITE_LT: u32 = 2;
pub const READW_LT: u32 = 3;
pub const WRITEW_LT: u32 = 4;

/// Delegation types in OPEN results.
pub const OPEN_DELEGATE_NONE: u32 = 0;
pub const OPEN_DELEGATE_READ: u32 = 1;
pub const OPEN_DELEGATE_WRITE: u32 = 2;

/// Owner identity for locks and opens: client id plus opaque owner bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct state_owner4 {
    pub clientid: u64,
    pub owner: Vec<u8>,
}
SerializeStruct!(state_owner4, clientid, owner);
DeserializeStruct!(state_owner4, clientid, owner);

/// SEQUENCE operation arguments.
#[derive(Clone, Debug, Default)]
pub struct SEQUENCE4args {
    pub sessionid: sessionid4,
    pub sequenceid: u32,
    pub slotid: u32,
    pub highest_slotid: u32,
    pub cachethis: bool,
}
SerializeStruct!(SEQUENCE4args, sessionid, sequenceid, slotid, highest_slotid, cachethis);
DeserializeStruct!(SEQUENCE4args, sessionid, sequenceid, slotid, highest_slotid, cachethis);

/// Channel attributes negotiated by CREATE_SESSION.
#[derive(Clone, Debug, Default)]
pub struct channel_attrs4 {
    pub ca_headerpadsize: u32,
    pub ca_maxrequestsize: u32,
    pub ca_maxresponsesize: u32,
    pub ca_maxresponsesize_cached: u32,
    pub ca_maxoperations: u32,
    pub ca_maxrequests: u32,
    pub ca_rdma_ird: Vec<u32>,
}
SerializeStruct!(
    channel_attrs4,
    ca_headerpadsize,
    ca_maxrequestsize,
    ca_maxresponsesize,
    ca_maxresponsesize_cached,
    ca_maxoperations,
    ca_maxrequests,
    ca_rdma_ird
);
DeserializeStruct!(
    channel_attrs4,
    ca_headerpadsize,
    ca_maxrequestsize,
    ca_maxresponsesize,
    ca_maxresponsesize_cached,
    ca_maxoperations,
    ca_maxrequests,
    ca_rdma_ird
);
