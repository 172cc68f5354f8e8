//! NFSPROC_SYMLINK (procedure 13).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{name_stat2, resolve_handle, vfs_stat2};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs2, Serialize};
use crate::security::{join_component, PERM_WRITE};

pub async fn nfsproc2_symlink(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs2::symlinkargs2>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc2_symlink({xid}, {:?})", String::from_utf8_lossy(&args.from.name));

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (dir, _) = match resolve_handle(context, &args.from.dir.data, PERM_WRITE, "SYMLINK").await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };
    let link = match join_component(&dir, &args.from.name) {
        Ok(link) => link,
        Err(e) => {
            context.security.audit(&context.sec, "SYMLINK", &dir, false, "bad name component");
            name_stat2(e).serialize(output)?;
            return Ok(());
        }
    };

    match context.vfs.symlink(&args.to, &link).await {
        Ok(_) => {
            context.security.audit(&context.sec, "SYMLINK", &link, true, "");
            nfs2::nfsstat2::NFS_OK.serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "SYMLINK", &link, false, "vfs error");
            vfs_stat2(e).serialize(output)?;
        }
    }
    Ok(())
}
