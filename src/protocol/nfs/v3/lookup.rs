//! NFSPROC3_LOOKUP (procedure 3, RFC 1813 section 3.3.3): translate a
//! directory entry name into a file handle.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{
    fattr3_from, handle_id_for, name_stat3, resolve_handle, vfs_stat3,
};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::{join_component, PERM_EXEC};

pub async fn nfsproc3_lookup(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::diropargs3>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_lookup({xid}, {:?})", args.name);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (dir, dir_stat) = match resolve_handle(context, &args.dir.data, PERM_EXEC, "LOOKUP").await
    {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };
    let dir_attr: nfs3::post_op_attr = Some(fattr3_from(&dir_stat));
    if !dir_stat.is_dir() {
        nfs3::nfsstat3::NFS3ERR_NOTDIR.serialize(output)?;
        dir_attr.serialize(output)?;
        return Ok(());
    }

    let path = match join_component(&dir, &args.name) {
        Ok(path) => path,
        Err(e) => {
            context.security.audit(&context.sec, "LOOKUP", &dir, false, "bad name component");
            name_stat3(e).serialize(output)?;
            dir_attr.serialize(output)?;
            return Ok(());
        }
    };

    match context.vfs.stat(&path).await {
        Ok(stat) => {
            let id = handle_id_for(context, &path, &stat);
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            nfs3::nfs_fh3 { data: context.handles.encode(id) }.serialize(output)?;
            Some(fattr3_from(&stat)).serialize(output)?;
            dir_attr.serialize(output)?;
        }
        Err(e) => {
            debug!("lookup miss {path:?}");
            vfs_stat3(e).serialize(output)?;
            dir_attr.serialize(output)?;
        }
    }
    Ok(())
}
