//! NFS version 2 (RFC 1094): the 18 original procedures.
//!
//! Version 2 is kept for legacy clients: handles are fixed 32 bytes,
//! offsets and sizes are 32-bit and transfers cap at 8 KiB. ROOT and
//! WRITECACHE were never given semantics by the protocol and answer
//! with empty success replies.

use std::io::{Read, Write};

use num_traits::cast::FromPrimitive;
use tracing::{debug, warn};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, nfs2, Serialize};

mod create;
mod getattr;
mod link;
mod lookup;
mod mkdir;
mod null;
mod read;
mod readdir;
mod readlink;
mod remove;
mod rename;
mod rmdir;
mod setattr;
mod statfs;
mod symlink;
mod write;

use create::nfsproc2_create;
use getattr::nfsproc2_getattr;
use link::nfsproc2_link;
use lookup::nfsproc2_lookup;
use mkdir::nfsproc2_mkdir;
use null::nfsproc2_null;
use read::nfsproc2_read;
use readdir::nfsproc2_readdir;
use readlink::nfsproc2_readlink;
use remove::nfsproc2_remove;
use rename::nfsproc2_rename;
use rmdir::nfsproc2_rmdir;
use setattr::nfsproc2_setattr;
use statfs::nfsproc2_statfs;
use symlink::nfsproc2_symlink;
use write::nfsproc2_write;

/// Dispatches one NFSv2 call. The version was validated upstream.
pub async fn handle_nfs2(
    xid: u32,
    call: &xdr::rpc::call_body,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let proc = nfs2::NfsProc2::from_u32(call.proc).unwrap_or(nfs2::NfsProc2::INVALID);
    match proc {
        nfs2::NfsProc2::NFSPROC_NULL => nfsproc2_null(xid, output)?,
        nfs2::NfsProc2::NFSPROC_GETATTR => nfsproc2_getattr(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_SETATTR => nfsproc2_setattr(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_ROOT | nfs2::NfsProc2::NFSPROC_WRITECACHE => {
            // Obsolete in RFC 1094; acknowledged with an empty reply.
            debug!("void v2 procedure {}", call.proc);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
        }
        nfs2::NfsProc2::NFSPROC_LOOKUP => nfsproc2_lookup(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_READLINK => nfsproc2_readlink(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_READ => nfsproc2_read(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_WRITE => nfsproc2_write(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_CREATE => nfsproc2_create(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_REMOVE => nfsproc2_remove(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_RENAME => nfsproc2_rename(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_LINK => nfsproc2_link(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_SYMLINK => nfsproc2_symlink(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_MKDIR => nfsproc2_mkdir(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_RMDIR => nfsproc2_rmdir(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_READDIR => nfsproc2_readdir(xid, input, output, context).await?,
        nfs2::NfsProc2::NFSPROC_STATFS => nfsproc2_statfs(xid, input, output, context).await?,
        nfs2::NfsProc2::INVALID => {
            warn!("unknown v2 procedure {}", call.proc);
            xdr::rpc::proc_unavail_reply_message(xid).serialize(output)?;
        }
    }
    Ok(())
}
