//! NFSPROC3_FSINFO (procedure 19, RFC 1813 section 3.3.19): static
//! capabilities of the served file system.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{fattr3_from, resolve_handle};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

pub async fn nfsproc3_fsinfo(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(fh) = deserialize::<nfs3::nfs_fh3>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_fsinfo({xid})");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    match resolve_handle(context, &fh.data, 0, "FSINFO").await {
        Ok((_, stat)) => {
            let transfer = context.config.max_request_size.min(1024 * 1024) as u32;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            nfs3::fs::FSINFO3resok {
                obj_attributes: Some(fattr3_from(&stat)),
                rtmax: transfer,
                rtpref: transfer,
                rtmult: 4096,
                wtmax: transfer,
                wtpref: transfer,
                wtmult: 4096,
                dtpref: 64 * 1024,
                maxfilesize: u64::MAX,
                time_delta: nfs3::nfstime3 { seconds: 0, nseconds: 1_000_000 },
                properties: nfs3::fs::FSF_LINK
                    | nfs3::fs::FSF_SYMLINK
                    | nfs3::fs::FSF_HOMOGENEOUS
                    | nfs3::fs::FSF_CANSETTIME,
            }
            .serialize(output)?;
        }
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
        }
    }
    Ok(())
}
