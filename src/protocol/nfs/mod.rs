//! NFS program handlers and the plumbing they share.
//!
//! Every file-handle based procedure runs the same resolution pipeline
//! implemented by [`resolve_handle`]: handle table lookup, lexical
//! canonicalization, export containment, security-manager access check,
//! then the VFS call. The stage that fails picks the protocol status
//! (`STALE`, `ACCES`, `NOENT`, ...), keeping the error planes identical
//! across protocol versions.

use std::path::PathBuf;

use crate::handle::HandleError;
use crate::protocol::rpc::Context;
use crate::protocol::xdr::{nfs2::nfsstat2, nfs3::nfsstat3, nfs4::nfsstat4};
use crate::security::NameError;
use crate::vfs::{FileKind, FileStat, SetTime, Timestamp, VfsError};

pub mod mount;
pub mod portmap;
pub mod v2;
pub mod v3;
pub mod v4;

/// Failure of the shared handle→path→access pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FhError {
    /// Handle bytes are malformed.
    BadHandle,
    /// Handle no longer names a live object.
    Stale,
    /// Containment or permission check failed.
    Access,
    /// The VFS refused the stat.
    Vfs(VfsError),
}

/// Resolves a file handle to a canonical path and its attributes,
/// enforcing `perms` (a PERM_* bitmask; pass 0 to skip the permission
/// check, e.g. for GETATTR).
pub(crate) async fn resolve_handle(
    context: &Context,
    fh: &[u8],
    perms: u8,
    op: &str,
) -> Result<(PathBuf, FileStat), FhError> {
    let resolved = context.handles.resolve(fh).map_err(|e| match e {
        HandleError::Bad => FhError::BadHandle,
        HandleError::Stale => FhError::Stale,
    })?;

    let Some(path) = context.security.contain_path(&resolved.path) else {
        context.security.audit(&context.sec, op, &resolved.path, false, "path escapes export");
        return Err(FhError::Access);
    };

    let stat = match context.vfs.stat(&path).await {
        Ok(stat) => stat,
        Err(VfsError::NotFound) => {
            // The object behind the handle is gone.
            context.handles.invalidate_id(resolved.id);
            return Err(FhError::Stale);
        }
        Err(e) => return Err(FhError::Vfs(e)),
    };
    if stat.fileid != resolved.fileid {
        context.handles.invalidate_id(resolved.id);
        return Err(FhError::Stale);
    }

    if perms != 0 && !context.security.check_access(&context.sec, &path, perms, &stat) {
        context.security.audit(&context.sec, op, &path, false, "access denied");
        return Err(FhError::Access);
    }

    Ok((path, stat))
}

/// Mints (or refreshes) the handle row for a path.
pub(crate) fn handle_id_for(context: &Context, path: &std::path::Path, stat: &FileStat) -> u64 {
    context.handles.handle_for(path, stat.fsid, stat.fileid)
}

impl FhError {
    pub(crate) fn as_stat2(self) -> nfsstat2 {
        match self {
            FhError::BadHandle | FhError::Stale => nfsstat2::NFSERR_STALE,
            FhError::Access => nfsstat2::NFSERR_ACCES,
            FhError::Vfs(e) => vfs_stat2(e),
        }
    }

    pub(crate) fn as_stat3(self) -> nfsstat3 {
        match self {
            FhError::BadHandle => nfsstat3::NFS3ERR_BADHANDLE,
            FhError::Stale => nfsstat3::NFS3ERR_STALE,
            FhError::Access => nfsstat3::NFS3ERR_ACCES,
            FhError::Vfs(e) => vfs_stat3(e),
        }
    }

    pub(crate) fn as_stat4(self) -> nfsstat4 {
        match self {
            FhError::BadHandle => nfsstat4::NFS4ERR_BADHANDLE,
            FhError::Stale => nfsstat4::NFS4ERR_STALE,
            FhError::Access => nfsstat4::NFS4ERR_ACCESS,
            FhError::Vfs(e) => vfs_stat4(e),
        }
    }
}

pub(crate) fn vfs_stat2(e: VfsError) -> nfsstat2 {
    match e {
        VfsError::NotFound => nfsstat2::NFSERR_NOENT,
        VfsError::Access => nfsstat2::NFSERR_ACCES,
        VfsError::Perm => nfsstat2::NFSERR_PERM,
        VfsError::Exists => nfsstat2::NFSERR_EXIST,
        VfsError::NotDir => nfsstat2::NFSERR_NOTDIR,
        VfsError::IsDir => nfsstat2::NFSERR_ISDIR,
        VfsError::NotEmpty => nfsstat2::NFSERR_NOTEMPTY,
        VfsError::NameTooLong => nfsstat2::NFSERR_NAMETOOLONG,
        VfsError::NoSpace => nfsstat2::NFSERR_NOSPC,
        VfsError::Quota => nfsstat2::NFSERR_DQUOT,
        VfsError::ReadOnly => nfsstat2::NFSERR_ROFS,
        VfsError::TooBig => nfsstat2::NFSERR_FBIG,
        _ => nfsstat2::NFSERR_IO,
    }
}

pub(crate) fn vfs_stat3(e: VfsError) -> nfsstat3 {
    match e {
        VfsError::NotFound => nfsstat3::NFS3ERR_NOENT,
        VfsError::Access => nfsstat3::NFS3ERR_ACCES,
        VfsError::Perm => nfsstat3::NFS3ERR_PERM,
        VfsError::Exists => nfsstat3::NFS3ERR_EXIST,
        VfsError::NotDir => nfsstat3::NFS3ERR_NOTDIR,
        VfsError::IsDir => nfsstat3::NFS3ERR_ISDIR,
        VfsError::NotEmpty => nfsstat3::NFS3ERR_NOTEMPTY,
        VfsError::NameTooLong => nfsstat3::NFS3ERR_NAMETOOLONG,
        VfsError::NoSpace => nfsstat3::NFS3ERR_NOSPC,
        VfsError::Quota => nfsstat3::NFS3ERR_DQUOT,
        VfsError::ReadOnly => nfsstat3::NFS3ERR_ROFS,
        VfsError::TooBig => nfsstat3::NFS3ERR_FBIG,
        VfsError::Invalid => nfsstat3::NFS3ERR_INVAL,
        VfsError::NotSupported => nfsstat3::NFS3ERR_NOTSUPP,
        VfsError::Delay => nfsstat3::NFS3ERR_JUKEBOX,
        VfsError::Io => nfsstat3::NFS3ERR_IO,
    }
}

pub(crate) fn vfs_stat4(e: VfsError) -> nfsstat4 {
    match e {
        VfsError::NotFound => nfsstat4::NFS4ERR_NOENT,
        VfsError::Access => nfsstat4::NFS4ERR_ACCESS,
        VfsError::Perm => nfsstat4::NFS4ERR_PERM,
        VfsError::Exists => nfsstat4::NFS4ERR_EXIST,
        VfsError::NotDir => nfsstat4::NFS4ERR_NOTDIR,
        VfsError::IsDir => nfsstat4::NFS4ERR_ISDIR,
        VfsError::NotEmpty => nfsstat4::NFS4ERR_NOTEMPTY,
        VfsError::NameTooLong => nfsstat4::NFS4ERR_NAMETOOLONG,
        VfsError::NoSpace => nfsstat4::NFS4ERR_NOSPC,
        VfsError::Quota => nfsstat4::NFS4ERR_DQUOT,
        VfsError::ReadOnly => nfsstat4::NFS4ERR_ROFS,
        VfsError::TooBig => nfsstat4::NFS4ERR_FBIG,
        VfsError::Invalid => nfsstat4::NFS4ERR_INVAL,
        VfsError::NotSupported => nfsstat4::NFS4ERR_NOTSUPP,
        VfsError::Delay => nfsstat4::NFS4ERR_DELAY,
        VfsError::Io => nfsstat4::NFS4ERR_IO,
    }
}

pub(crate) fn name_stat2(e: NameError) -> nfsstat2 {
    match e {
        NameError::Traversal => nfsstat2::NFSERR_ACCES,
        NameError::Empty => nfsstat2::NFSERR_NOENT,
        NameError::TooLong => nfsstat2::NFSERR_NAMETOOLONG,
    }
}

pub(crate) fn name_stat3(e: NameError) -> nfsstat3 {
    match e {
        NameError::Traversal => nfsstat3::NFS3ERR_ACCES,
        NameError::Empty => nfsstat3::NFS3ERR_NOENT,
        NameError::TooLong => nfsstat3::NFS3ERR_NAMETOOLONG,
    }
}

pub(crate) fn name_stat4(e: NameError) -> nfsstat4 {
    match e {
        NameError::Traversal => nfsstat4::NFS4ERR_ACCESS,
        NameError::Empty => nfsstat4::NFS4ERR_NOENT,
        NameError::TooLong => nfsstat4::NFS4ERR_NAMETOOLONG,
    }
}

pub(crate) fn nfstime3_from(ts: Timestamp) -> crate::protocol::xdr::nfs3::nfstime3 {
    crate::protocol::xdr::nfs3::nfstime3 {
        seconds: ts.seconds.max(0) as u32,
        nseconds: ts.nanos,
    }
}

pub(crate) fn fattr3_from(stat: &FileStat) -> crate::protocol::xdr::nfs3::fattr3 {
    use crate::protocol::xdr::nfs3::{fattr3, ftype3, specdata3};
    fattr3 {
        ftype: match stat.kind {
            FileKind::Regular => ftype3::NF3REG,
            FileKind::Directory => ftype3::NF3DIR,
            FileKind::Block => ftype3::NF3BLK,
            FileKind::Char => ftype3::NF3CHR,
            FileKind::Symlink => ftype3::NF3LNK,
            FileKind::Socket => ftype3::NF3SOCK,
            FileKind::Fifo => ftype3::NF3FIFO,
        },
        mode: stat.mode,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        size: stat.size,
        used: stat.used,
        rdev: specdata3 { specdata1: stat.rdev.0, specdata2: stat.rdev.1 },
        fsid: stat.fsid,
        fileid: stat.fileid,
        atime: nfstime3_from(stat.atime),
        mtime: nfstime3_from(stat.mtime),
        ctime: nfstime3_from(stat.ctime),
    }
}

pub(crate) fn fattr2_from(stat: &FileStat) -> crate::protocol::xdr::nfs2::fattr2 {
    use crate::protocol::xdr::nfs2::{fattr2, ftype2, timeval2};
    let timeval = |ts: Timestamp| timeval2 { seconds: ts.seconds.max(0) as u32,
                                             useconds: ts.nanos / 1000 };
    fattr2 {
        ftype: match stat.kind {
            FileKind::Regular => ftype2::NFREG,
            FileKind::Directory => ftype2::NFDIR,
            FileKind::Block => ftype2::NFBLK,
            FileKind::Char => ftype2::NFCHR,
            FileKind::Symlink => ftype2::NFLNK,
            FileKind::Socket | FileKind::Fifo => ftype2::NFNON,
        },
        mode: stat.mode,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        size: stat.size.min(u32::MAX as u64) as u32,
        blocksize: 4096,
        rdev: stat.rdev.0 << 8 | (stat.rdev.1 & 0xff),
        blocks: (stat.used / 512).min(u32::MAX as u64) as u32,
        fsid: stat.fsid as u32,
        fileid: stat.fileid as u32,
        atime: timeval(stat.atime),
        mtime: timeval(stat.mtime),
        ctime: timeval(stat.ctime),
    }
}

/// Translates v3 settable attributes into the VFS shape.
pub(crate) fn setattrs_from_sattr3(
    sattr: &crate::protocol::xdr::nfs3::sattr3,
) -> crate::vfs::SetAttrs {
    use crate::protocol::xdr::nfs3::set_time3;
    let time = |t: &set_time3| match t {
        set_time3::DONT_CHANGE => None,
        set_time3::SET_TO_SERVER_TIME => Some(SetTime::ServerTime),
        set_time3::SET_TO_CLIENT_TIME(v) => Some(SetTime::ClientTime(Timestamp {
            seconds: v.seconds as i64,
            nanos: v.nseconds,
        })),
    };
    crate::vfs::SetAttrs {
        mode: sattr.mode,
        uid: sattr.uid,
        gid: sattr.gid,
        size: sattr.size,
        atime: time(&sattr.atime),
        mtime: time(&sattr.mtime),
    }
}

/// Translates v2 settable attributes (all-ones means "leave alone").
pub(crate) fn setattrs_from_sattr2(
    sattr: &crate::protocol::xdr::nfs2::sattr2,
) -> crate::vfs::SetAttrs {
    let opt = |v: u32| (v != u32::MAX).then_some(v);
    crate::vfs::SetAttrs {
        mode: opt(sattr.mode),
        uid: opt(sattr.uid),
        gid: opt(sattr.gid),
        size: opt(sattr.size).map(u64::from),
        atime: (sattr.atime.seconds != u32::MAX).then_some(SetTime::ClientTime(Timestamp {
            seconds: sattr.atime.seconds as i64,
            nanos: sattr.atime.useconds.saturating_mul(1000),
        })),
        mtime: (sattr.mtime.seconds != u32::MAX).then_some(SetTime::ClientTime(Timestamp {
            seconds: sattr.mtime.seconds as i64,
            nanos: sattr.mtime.useconds.saturating_mul(1000),
        })),
    }
}
