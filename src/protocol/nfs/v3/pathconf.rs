//! NFSPROC3_PATHCONF (procedure 20, RFC 1813 section 3.3.20).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{fattr3_from, resolve_handle};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

pub async fn nfsproc3_pathconf(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(fh) = deserialize::<nfs3::nfs_fh3>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_pathconf({xid})");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    match resolve_handle(context, &fh.data, 0, "PATHCONF").await {
        Ok((_, stat)) => {
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            nfs3::fs::PATHCONF3resok {
                obj_attributes: Some(fattr3_from(&stat)),
                linkmax: 32_000,
                name_max: 255,
                no_trunc: true,
                chown_restricted: true,
                case_insensitive: false,
                case_preserving: true,
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
