//! NFSPROC_WRITE (procedure 8). Version 2 writes are always synchronous
//! (FILE_SYNC in v3 terms).

use std::io::{Read, Write};

use tracing::debug;

use crate::access::{AccessMode, SharingMode};
use crate::protocol::nfs::{fattr2_from, resolve_handle, vfs_stat2};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs2, Serialize};
use crate::security::PERM_WRITE;

pub async fn nfsproc2_write(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs2::writeargs2>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc2_write({xid}, offset={}, len={})", args.offset, args.data.len());

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    if args.data.len() > nfs2::NFS2_MAXDATA as usize {
        nfs2::nfsstat2::NFSERR_FBIG.serialize(output)?;
        return Ok(());
    }

    let path = match resolve_handle(context, &args.file.data, PERM_WRITE, "WRITE").await {
        Ok((path, _)) => path,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };

    let owner = context.client_owner();
    if context
        .access
        .acquire(&path, &owner, AccessMode::WriteOnly, SharingMode::SharedWrite)
        .is_err()
    {
        context.security.audit(&context.sec, "WRITE", &path, false, "share conflict");
        nfs2::nfsstat2::NFSERR_ACCES.serialize(output)?;
        return Ok(());
    }

    match context.vfs.write(&path, args.offset as u64, &args.data, true).await {
        Ok(stat) => {
            context.security.audit(&context.sec, "WRITE", &path, true, "");
            nfs2::nfsstat2::NFS_OK.serialize(output)?;
            fattr2_from(&stat).serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "WRITE", &path, false, "vfs error");
            vfs_stat2(e).serialize(output)?;
        }
    }
    Ok(())
}
