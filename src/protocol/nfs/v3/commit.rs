//! NFSPROC3_COMMIT (procedure 21, RFC 1813 section 3.3.21): flush
//! previously UNSTABLE writes. The verifier must match the one returned
//! by WRITE so the client can detect a restart in between.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{fattr3_from, resolve_handle, vfs_stat3};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::PERM_WRITE;

use super::wcc_since;

pub async fn nfsproc3_commit(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::file::COMMIT3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_commit({xid}, offset={}, count={})", args.offset, args.count);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (path, stat) = match resolve_handle(context, &args.file.data, PERM_WRITE, "COMMIT").await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let before: nfs3::pre_op_attr = Some(nfs3::wcc_attr::from(fattr3_from(&stat)));

    match context.vfs.commit(&path).await {
        Ok(()) => {
            context.security.audit(&context.sec, "COMMIT", &path, true, "");
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            nfs3::file::COMMIT3resok {
                file_wcc: wcc_since(context, before, &path).await,
                verf: context.handles.boot_verifier(),
            }
            .serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "COMMIT", &path, false, "vfs error");
            vfs_stat3(e).serialize(output)?;
            wcc_since(context, before, &path).await.serialize(output)?;
        }
    }
    Ok(())
}
