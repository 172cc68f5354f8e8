//! NFSPROC_READLINK (procedure 5).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{resolve_handle, vfs_stat2};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs2, Serialize};
use crate::security::PERM_READ;

pub async fn nfsproc2_readlink(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(fh) = deserialize::<nfs2::fhandle2>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc2_readlink({xid})");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let path = match resolve_handle(context, &fh.data, PERM_READ, "READLINK").await {
        Ok((path, _)) => path,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };

    match context.vfs.readlink(&path).await {
        Ok(target) => {
            nfs2::nfsstat2::NFS_OK.serialize(output)?;
            target.serialize(output)?;
        }
        Err(e) => vfs_stat2(e).serialize(output)?,
    }
    Ok(())
}
