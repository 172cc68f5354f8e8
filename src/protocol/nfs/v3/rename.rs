//! NFSPROC3_RENAME (procedure 14, RFC 1813 section 3.3.14). The reply
//! carries WCC data for both directories.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{name_stat3, resolve_handle, vfs_stat3};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::{join_component, PERM_WRITE};

use super::wcc_since;

pub async fn nfsproc3_rename(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::file::RENAME3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_rename({xid}, {:?} -> {:?})", args.from.name, args.to.name);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (from_dir, _) =
        match resolve_handle(context, &args.from.dir.data, PERM_WRITE, "RENAME").await {
            Ok(resolved) => resolved,
            Err(e) => {
                e.as_stat3().serialize(output)?;
                nfs3::wcc_data::default().serialize(output)?;
                nfs3::wcc_data::default().serialize(output)?;
                return Ok(());
            }
        };
    let (to_dir, _) = match resolve_handle(context, &args.to.dir.data, PERM_WRITE, "RENAME").await
    {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let from_before = super::pre_attr(context, &from_dir).await;
    let to_before = super::pre_attr(context, &to_dir).await;

    let (from, to) = match (
        join_component(&from_dir, &args.from.name),
        join_component(&to_dir, &args.to.name),
    ) {
        (Ok(from), Ok(to)) => (from, to),
        (Err(e), _) | (_, Err(e)) => {
            context.security.audit(&context.sec, "RENAME", &from_dir, false,
                                   "bad name component");
            name_stat3(e).serialize(output)?;
            wcc_since(context, from_before, &from_dir).await.serialize(output)?;
            wcc_since(context, to_before, &to_dir).await.serialize(output)?;
            return Ok(());
        }
    };

    match context.vfs.rename(&from, &to).await {
        Ok(()) => {
            context.handles.invalidate(&from);
            context.handles.invalidate(&to);
            context.access.release_path(&from);
            context.security.audit(&context.sec, "RENAME", &from, true, "");
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "RENAME", &from, false, "vfs error");
            vfs_stat3(e).serialize(output)?;
        }
    }
    wcc_since(context, from_before, &from_dir).await.serialize(output)?;
    wcc_since(context, to_before, &to_dir).await.serialize(output)?;
    Ok(())
}
