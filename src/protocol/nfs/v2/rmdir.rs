//! NFSPROC_RMDIR (procedure 15).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{name_stat2, resolve_handle, vfs_stat2};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs2, Serialize};
use crate::security::{join_component, PERM_WRITE};

pub async fn nfsproc2_rmdir(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs2::diropargs2>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc2_rmdir({xid}, {:?})", String::from_utf8_lossy(&args.name));

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (dir, _) = match resolve_handle(context, &args.dir.data, PERM_WRITE, "RMDIR").await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };
    let path = match join_component(&dir, &args.name) {
        Ok(path) => path,
        Err(e) => {
            context.security.audit(&context.sec, "RMDIR", &dir, false, "bad name component");
            name_stat2(e).serialize(output)?;
            return Ok(());
        }
    };

    match context.vfs.rmdir(&path).await {
        Ok(()) => {
            context.handles.invalidate(&path);
            context.security.audit(&context.sec, "RMDIR", &path, true, "");
            nfs2::nfsstat2::NFS_OK.serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "RMDIR", &path, false, "vfs error");
            vfs_stat2(e).serialize(output)?;
        }
    }
    Ok(())
}
