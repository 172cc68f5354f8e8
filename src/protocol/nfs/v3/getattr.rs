//! NFSPROC3_GETATTR (procedure 1, RFC 1813 section 3.3.1).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{fattr3_from, resolve_handle};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

pub async fn nfsproc3_getattr(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::file::GETATTR3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_getattr({xid})");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    match resolve_handle(context, &args.object.data, 0, "GETATTR").await {
        Ok((_, stat)) => {
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            fattr3_from(&stat).serialize(output)?;
        }
        Err(e) => e.as_stat3().serialize(output)?,
    }
    Ok(())
}
