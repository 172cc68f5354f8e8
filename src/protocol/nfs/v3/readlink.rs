//! NFSPROC3_READLINK (procedure 5, RFC 1813 section 3.3.5).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{fattr3_from, resolve_handle, vfs_stat3};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::PERM_READ;

pub async fn nfsproc3_readlink(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(fh) = deserialize::<nfs3::nfs_fh3>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_readlink({xid})");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (path, stat) = match resolve_handle(context, &fh.data, PERM_READ, "READLINK").await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };

    match context.vfs.readlink(&path).await {
        Ok(target) => {
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            Some(fattr3_from(&stat)).serialize(output)?;
            nfs3::nfspath3::from(target).serialize(output)?;
        }
        Err(e) => {
            vfs_stat3(e).serialize(output)?;
            Some(fattr3_from(&stat)).serialize(output)?;
        }
    }
    Ok(())
}
