//! NFS version 3 (RFC 1813): all 22 procedures.
//!
//! Every mutating reply carries weak cache consistency data assembled
//! from a pre-operation attribute sample and a post-operation stat, so
//! clients can detect updates they did not observe. WRITE honors the
//! requested stability and pairs with COMMIT through the boot-time
//! write verifier.

use std::io::{Read, Write};
use std::path::Path;

use num_traits::cast::FromPrimitive;
use tracing::warn;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, nfs3, Serialize};

mod access;
mod commit;
mod create;
mod fsinfo;
mod fsstat;
mod getattr;
mod link;
mod lookup;
mod mkdir;
mod mknod;
mod null;
mod pathconf;
mod read;
mod readdir;
mod readdirplus;
mod readlink;
mod remove;
mod rename;
mod setattr;
mod symlink;
mod write;

use access::nfsproc3_access;
use commit::nfsproc3_commit;
use create::nfsproc3_create;
use fsinfo::nfsproc3_fsinfo;
use fsstat::nfsproc3_fsstat;
use getattr::nfsproc3_getattr;
use link::nfsproc3_link;
use lookup::nfsproc3_lookup;
use mkdir::nfsproc3_mkdir;
use mknod::nfsproc3_mknod;
use null::nfsproc3_null;
use pathconf::nfsproc3_pathconf;
use read::nfsproc3_read;
use readdir::nfsproc3_readdir;
use readdirplus::nfsproc3_readdirplus;
use readlink::nfsproc3_readlink;
use remove::nfsproc3_remove;
use rename::nfsproc3_rename;
use setattr::nfsproc3_setattr;
use symlink::nfsproc3_symlink;
use write::nfsproc3_write;

/// Post-operation attributes of `path`, when it can still be stated.
pub(crate) async fn post_attr(context: &rpc::Context, path: &Path) -> nfs3::post_op_attr {
    context
        .vfs
        .stat(path)
        .await
        .ok()
        .map(|stat| crate::protocol::nfs::fattr3_from(&stat))
}

/// Pre-operation attribute sample for WCC data.
pub(crate) async fn pre_attr(context: &rpc::Context, path: &Path) -> nfs3::pre_op_attr {
    context
        .vfs
        .stat(path)
        .await
        .ok()
        .map(|stat| nfs3::wcc_attr::from(crate::protocol::nfs::fattr3_from(&stat)))
}

/// WCC data from a previously captured pre-op sample.
pub(crate) async fn wcc_since(
    context: &rpc::Context,
    before: nfs3::pre_op_attr,
    path: &Path,
) -> nfs3::wcc_data {
    nfs3::wcc_data { before, after: post_attr(context, path).await }
}

/// Emits the procedure's failure shape carrying JUKEBOX so an
/// overloaded server can shed load without breaking client decoders.
fn jukebox_reply(
    xid: u32,
    proc: nfs3::NfsProc3,
    output: &mut impl Write,
) -> Result<(), anyhow::Error> {
    use nfs3::NfsProc3::*;
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    nfs3::nfsstat3::NFS3ERR_JUKEBOX.serialize(output)?;
    match proc {
        NFSPROC3_GETATTR => {}
        NFSPROC3_SETATTR | NFSPROC3_WRITE | NFSPROC3_CREATE | NFSPROC3_MKDIR
        | NFSPROC3_SYMLINK | NFSPROC3_MKNOD | NFSPROC3_REMOVE | NFSPROC3_RMDIR
        | NFSPROC3_COMMIT => {
            nfs3::wcc_data::default().serialize(output)?;
        }
        NFSPROC3_RENAME => {
            nfs3::wcc_data::default().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
        }
        NFSPROC3_LINK => {
            nfs3::post_op_attr::None.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
        }
        _ => {
            nfs3::post_op_attr::None.serialize(output)?;
        }
    }
    Ok(())
}

/// Dispatches one NFSv3 call. The version was validated upstream.
pub async fn handle_nfs3(
    xid: u32,
    call: &xdr::rpc::call_body,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let proc = nfs3::NfsProc3::from_u32(call.proc).unwrap_or(nfs3::NfsProc3::INVALID);
    if context.load.overloaded()
        && !matches!(proc, nfs3::NfsProc3::NFSPROC3_NULL | nfs3::NfsProc3::INVALID)
    {
        warn!("over high-water mark, answering JUKEBOX");
        return jukebox_reply(xid, proc, output);
    }
    match proc {
        nfs3::NfsProc3::NFSPROC3_NULL => nfsproc3_null(xid, output)?,
        nfs3::NfsProc3::NFSPROC3_GETATTR => nfsproc3_getattr(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_SETATTR => nfsproc3_setattr(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_LOOKUP => nfsproc3_lookup(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_ACCESS => nfsproc3_access(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_READLINK => {
            nfsproc3_readlink(xid, input, output, context).await?
        }
        nfs3::NfsProc3::NFSPROC3_READ => nfsproc3_read(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_WRITE => nfsproc3_write(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_CREATE => nfsproc3_create(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_MKDIR => nfsproc3_mkdir(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_SYMLINK => nfsproc3_symlink(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_MKNOD => nfsproc3_mknod(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_REMOVE => {
            nfsproc3_remove(xid, input, output, context, false).await?
        }
        nfs3::NfsProc3::NFSPROC3_RMDIR => {
            nfsproc3_remove(xid, input, output, context, true).await?
        }
        nfs3::NfsProc3::NFSPROC3_RENAME => nfsproc3_rename(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_LINK => nfsproc3_link(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_READDIR => nfsproc3_readdir(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_READDIRPLUS => {
            nfsproc3_readdirplus(xid, input, output, context).await?
        }
        nfs3::NfsProc3::NFSPROC3_FSSTAT => nfsproc3_fsstat(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_FSINFO => nfsproc3_fsinfo(xid, input, output, context).await?,
        nfs3::NfsProc3::NFSPROC3_PATHCONF => {
            nfsproc3_pathconf(xid, input, output, context).await?
        }
        nfs3::NfsProc3::NFSPROC3_COMMIT => nfsproc3_commit(xid, input, output, context).await?,
        nfs3::NfsProc3::INVALID => {
            warn!("unknown v3 procedure {}", call.proc);
            xdr::rpc::proc_unavail_reply_message(xid).serialize(output)?;
        }
    }
    Ok(())
}
