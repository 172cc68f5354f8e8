//! NFSPROC_GETATTR (procedure 1).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{fattr2_from, resolve_handle};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs2, Serialize};

pub async fn nfsproc2_getattr(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(fh) = deserialize::<nfs2::fhandle2>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc2_getattr({xid})");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    match resolve_handle(context, &fh.data, 0, "GETATTR").await {
        Ok((_, stat)) => {
            nfs2::nfsstat2::NFS_OK.serialize(output)?;
            fattr2_from(&stat).serialize(output)?;
        }
        Err(e) => e.as_stat2().serialize(output)?,
    }
    Ok(())
}
