//! NFSPROC_RENAME (procedure 11).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{name_stat2, resolve_handle, vfs_stat2};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs2, Serialize};
use crate::security::{join_component, PERM_WRITE};

pub async fn nfsproc2_rename(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs2::renameargs2>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc2_rename({xid})");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (from_dir, _) = match resolve_handle(context, &args.from.dir.data, PERM_WRITE, "RENAME")
        .await
    {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };
    let (to_dir, _) = match resolve_handle(context, &args.to.dir.data, PERM_WRITE, "RENAME").await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };
    let (from, to) = match (
        join_component(&from_dir, &args.from.name),
        join_component(&to_dir, &args.to.name),
    ) {
        (Ok(from), Ok(to)) => (from, to),
        (Err(e), _) | (_, Err(e)) => {
            context.security.audit(&context.sec, "RENAME", &from_dir, false, "bad name component");
            name_stat2(e).serialize(output)?;
            return Ok(());
        }
    };

    match context.vfs.rename(&from, &to).await {
        Ok(()) => {
            context.handles.invalidate(&from);
            context.handles.invalidate(&to);
            context.access.release_path(&from);
            context.security.audit(&context.sec, "RENAME", &from, true, "");
            nfs2::nfsstat2::NFS_OK.serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "RENAME", &from, false, "vfs error");
            vfs_stat2(e).serialize(output)?;
        }
    }
    Ok(())
}
