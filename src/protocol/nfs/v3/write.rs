//! NFSPROC3_WRITE (procedure 7, RFC 1813 section 3.3.7).
//!
//! UNSTABLE writes may be buffered and only reach stable storage when
//! COMMIT is called; DATA_SYNC and FILE_SYNC writes are synced before
//! the reply. The returned verifier changes only across restarts so a
//! client can detect that buffered data was lost with the server.

use std::io::{Read, Write};

use tracing::{debug, error};

use crate::access::{AccessMode, SharingMode};
use crate::protocol::nfs::{resolve_handle, vfs_stat3};
use crate::protocol::rpc;
use crate::protocol::xdr::nfs3::file::stable_how;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::PERM_WRITE;

use super::wcc_since;

pub async fn nfsproc3_write(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::file::WRITE3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_write({xid}, offset={}, count={})", args.offset, args.count);

    if args.data.len() != args.count as usize {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    }

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (path, stat) = match resolve_handle(context, &args.file.data, PERM_WRITE, "WRITE").await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let before: nfs3::pre_op_attr =
        Some(nfs3::wcc_attr::from(crate::protocol::nfs::fattr3_from(&stat)));

    let owner = context.client_owner();
    if context
        .access
        .acquire(&path, &owner, AccessMode::WriteOnly, SharingMode::SharedWrite)
        .is_err()
    {
        context.security.audit(&context.sec, "WRITE", &path, false, "share conflict");
        nfs3::nfsstat3::NFS3ERR_ACCES.serialize(output)?;
        nfs3::wcc_data::default().serialize(output)?;
        return Ok(());
    }

    let sync = !matches!(args.stable, stable_how::UNSTABLE);
    match context.vfs.write(&path, args.offset, &args.data, sync).await {
        Ok(_) => {
            context.security.audit(&context.sec, "WRITE", &path, true, "");
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            nfs3::file::WRITE3resok {
                file_wcc: wcc_since(context, before, &path).await,
                count: args.count,
                committed: args.stable,
                verf: context.handles.boot_verifier(),
            }
            .serialize(output)?;
        }
        Err(e) => {
            error!("write error {xid} -> {e:?}");
            context.security.audit(&context.sec, "WRITE", &path, false, "vfs error");
            vfs_stat3(e).serialize(output)?;
            wcc_since(context, before, &path).await.serialize(output)?;
        }
    }
    Ok(())
}
