//! NFSPROC_READ (procedure 6). Transfers cap at 8 KiB; the first read
//! by a client registers a shared-read record in the access tracker.

use std::io::{Read, Write};

use tracing::debug;

use crate::access::{AccessMode, SharingMode};
use crate::protocol::nfs::{fattr2_from, resolve_handle, vfs_stat2};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs2, Serialize};
use crate::security::PERM_READ;

pub async fn nfsproc2_read(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs2::readargs2>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc2_read({xid}, offset={}, count={})", args.offset, args.count);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let path = match resolve_handle(context, &args.file.data, PERM_READ, "READ").await {
        Ok((path, _)) => path,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };

    let owner = context.client_owner();
    if context
        .access
        .acquire(&path, &owner, AccessMode::ReadOnly, SharingMode::SharedRead)
        .is_err()
    {
        context.security.audit(&context.sec, "READ", &path, false, "share conflict");
        nfs2::nfsstat2::NFSERR_ACCES.serialize(output)?;
        return Ok(());
    }

    let count = args.count.min(nfs2::NFS2_MAXDATA);
    match context.vfs.read(&path, args.offset as u64, count).await {
        Ok((data, _eof)) => {
            let stat = context.vfs.stat(&path).await.unwrap_or_default();
            context.security.audit(&context.sec, "READ", &path, true, "");
            nfs2::nfsstat2::NFS_OK.serialize(output)?;
            fattr2_from(&stat).serialize(output)?;
            data.serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "READ", &path, false, "vfs error");
            vfs_stat2(e).serialize(output)?;
        }
    }
    Ok(())
}
