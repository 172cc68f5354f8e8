//! NFSPROC_LOOKUP (procedure 4): translate a name in a directory to a
//! file handle.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{
    fattr2_from, handle_id_for, name_stat2, resolve_handle, vfs_stat2,
};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs2, Serialize};
use crate::security::{join_component, PERM_EXEC};

pub async fn nfsproc2_lookup(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs2::diropargs2>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc2_lookup({xid}, {:?})", String::from_utf8_lossy(&args.name));

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (dir, dir_stat) = match resolve_handle(context, &args.dir.data, PERM_EXEC, "LOOKUP").await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };
    if !dir_stat.is_dir() {
        nfs2::nfsstat2::NFSERR_NOTDIR.serialize(output)?;
        return Ok(());
    }

    let path = match join_component(&dir, &args.name) {
        Ok(path) => path,
        Err(e) => {
            context.security.audit(&context.sec, "LOOKUP", &dir, false, "bad name component");
            name_stat2(e).serialize(output)?;
            return Ok(());
        }
    };

    match context.vfs.stat(&path).await {
        Ok(stat) => {
            let id = handle_id_for(context, &path, &stat);
            nfs2::nfsstat2::NFS_OK.serialize(output)?;
            nfs2::fhandle2 { data: context.handles.encode_v2(id) }.serialize(output)?;
            fattr2_from(&stat).serialize(output)?;
        }
        Err(e) => vfs_stat2(e).serialize(output)?,
    }
    Ok(())
}
