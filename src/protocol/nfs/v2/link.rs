//! NFSPROC_LINK (procedure 12).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{name_stat2, resolve_handle, vfs_stat2};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs2, Serialize};
use crate::security::{join_component, PERM_READ, PERM_WRITE};

pub async fn nfsproc2_link(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs2::linkargs2>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc2_link({xid})");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (existing, _) = match resolve_handle(context, &args.from.data, PERM_READ, "LINK").await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };
    let (to_dir, _) = match resolve_handle(context, &args.to.dir.data, PERM_WRITE, "LINK").await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };
    let link = match join_component(&to_dir, &args.to.name) {
        Ok(link) => link,
        Err(e) => {
            context.security.audit(&context.sec, "LINK", &to_dir, false, "bad name component");
            name_stat2(e).serialize(output)?;
            return Ok(());
        }
    };

    match context.vfs.link(&existing, &link).await {
        Ok(_) => {
            context.security.audit(&context.sec, "LINK", &link, true, "");
            nfs2::nfsstat2::NFS_OK.serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "LINK", &link, false, "vfs error");
            vfs_stat2(e).serialize(output)?;
        }
    }
    Ok(())
}
