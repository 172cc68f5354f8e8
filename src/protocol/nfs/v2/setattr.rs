//! NFSPROC_SETATTR (procedure 2).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{fattr2_from, resolve_handle, setattrs_from_sattr2, vfs_stat2};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs2, Serialize};
use crate::security::PERM_WRITE;

pub async fn nfsproc2_setattr(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let (Ok(fh), Ok(sattr)) =
        (deserialize::<nfs2::fhandle2>(input), deserialize::<nfs2::sattr2>(input))
    else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc2_setattr({xid})");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let path = match resolve_handle(context, &fh.data, PERM_WRITE, "SETATTR").await {
        Ok((path, _)) => path,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };

    match context.vfs.setattr(&path, &setattrs_from_sattr2(&sattr)).await {
        Ok(stat) => {
            context.security.audit(&context.sec, "SETATTR", &path, true, "");
            nfs2::nfsstat2::NFS_OK.serialize(output)?;
            fattr2_from(&stat).serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "SETATTR", &path, false, "vfs error");
            vfs_stat2(e).serialize(output)?;
        }
    }
    Ok(())
}
