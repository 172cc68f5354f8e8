//! NFSPROC_CREATE (procedure 9).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{
    fattr2_from, handle_id_for, name_stat2, resolve_handle, setattrs_from_sattr2, vfs_stat2,
};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs2, Serialize};
use crate::security::{join_component, PERM_WRITE};

pub async fn nfsproc2_create(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs2::createargs2>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc2_create({xid}, {:?})", String::from_utf8_lossy(&args.r#where.name));

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (dir, _) = match resolve_handle(context, &args.r#where.dir.data, PERM_WRITE, "CREATE").await
    {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };
    let path = match join_component(&dir, &args.r#where.name) {
        Ok(path) => path,
        Err(e) => {
            context.security.audit(&context.sec, "CREATE", &dir, false, "bad name component");
            name_stat2(e).serialize(output)?;
            return Ok(());
        }
    };

    let mode = if args.attributes.mode != u32::MAX { args.attributes.mode } else { 0o644 };
    match context.vfs.create(&path, mode, false).await {
        Ok(_) => {
            // Apply the remaining requested attributes, then report.
            let attrs = setattrs_from_sattr2(&args.attributes);
            let stat = match context.vfs.setattr(&path, &attrs).await {
                Ok(stat) => stat,
                Err(_) => context.vfs.stat(&path).await.unwrap_or_default(),
            };
            let id = handle_id_for(context, &path, &stat);
            context.security.audit(&context.sec, "CREATE", &path, true, "");
            nfs2::nfsstat2::NFS_OK.serialize(output)?;
            nfs2::fhandle2 { data: context.handles.encode_v2(id) }.serialize(output)?;
            fattr2_from(&stat).serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "CREATE", &path, false, "vfs error");
            vfs_stat2(e).serialize(output)?;
        }
    }
    Ok(())
}
