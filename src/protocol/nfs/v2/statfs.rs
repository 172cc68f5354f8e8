//! NFSPROC_STATFS (procedure 17).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{resolve_handle, vfs_stat2};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs2, Serialize};

pub async fn nfsproc2_statfs(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(fh) = deserialize::<nfs2::fhandle2>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc2_statfs({xid})");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let path = match resolve_handle(context, &fh.data, 0, "STATFS").await {
        Ok((path, _)) => path,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };

    match context.vfs.fsstat(&path).await {
        Ok(fs) => {
            const BSIZE: u64 = 4096;
            nfs2::nfsstat2::NFS_OK.serialize(output)?;
            nfs2::statfsok2 {
                tsize: nfs2::NFS2_MAXDATA,
                bsize: BSIZE as u32,
                blocks: (fs.total_bytes / BSIZE).min(u32::MAX as u64) as u32,
                bfree: (fs.free_bytes / BSIZE).min(u32::MAX as u64) as u32,
                bavail: (fs.avail_bytes / BSIZE).min(u32::MAX as u64) as u32,
            }
            .serialize(output)?;
        }
        Err(e) => vfs_stat2(e).serialize(output)?,
    }
    Ok(())
}
