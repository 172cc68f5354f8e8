//! NFSPROC3_REMOVE and NFSPROC3_RMDIR (procedures 12 and 13, RFC 1813
//! sections 3.3.12 and 3.3.13). The two procedures share their argument
//! and reply shape and differ only in the VFS call.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{name_stat3, resolve_handle, vfs_stat3};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::{join_component, PERM_WRITE};

use super::wcc_since;

pub async fn nfsproc3_remove(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
    is_rmdir: bool,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::diropargs3>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    let op = if is_rmdir { "RMDIR" } else { "REMOVE" };
    debug!("nfsproc3_remove({xid}, {:?}, rmdir={is_rmdir})", args.name);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (dir, _) = match resolve_handle(context, &args.dir.data, PERM_WRITE, op).await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let dir_before = super::pre_attr(context, &dir).await;

    let path = match join_component(&dir, &args.name) {
        Ok(path) => path,
        Err(e) => {
            context.security.audit(&context.sec, op, &dir, false, "bad name component");
            name_stat3(e).serialize(output)?;
            wcc_since(context, dir_before, &dir).await.serialize(output)?;
            return Ok(());
        }
    };

    let result = if is_rmdir {
        context.vfs.rmdir(&path).await
    } else {
        context.vfs.remove(&path).await
    };
    match result {
        Ok(()) => {
            context.handles.invalidate(&path);
            context.access.release_path(&path);
            context.security.audit(&context.sec, op, &path, true, "");
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, op, &path, false, "vfs error");
            vfs_stat3(e).serialize(output)?;
        }
    }
    wcc_since(context, dir_before, &dir).await.serialize(output)?;
    Ok(())
}
