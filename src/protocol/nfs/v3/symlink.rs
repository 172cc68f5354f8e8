//! NFSPROC3_SYMLINK (procedure 10, RFC 1813 section 3.3.10).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{
    fattr3_from, handle_id_for, name_stat3, resolve_handle, vfs_stat3,
};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::{join_component, PERM_WRITE};

use super::wcc_since;

pub async fn nfsproc3_symlink(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::file::SYMLINK3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_symlink({xid}, {:?} -> {:?})", args.r#where.name, args.symlink.symlink_data);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (dir, _) = match resolve_handle(context, &args.r#where.dir.data, PERM_WRITE, "SYMLINK")
        .await
    {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let dir_before = super::pre_attr(context, &dir).await;

    let link = match join_component(&dir, &args.r#where.name) {
        Ok(link) => link,
        Err(e) => {
            context.security.audit(&context.sec, "SYMLINK", &dir, false, "bad name component");
            name_stat3(e).serialize(output)?;
            wcc_since(context, dir_before, &dir).await.serialize(output)?;
            return Ok(());
        }
    };

    match context.vfs.symlink(args.symlink.symlink_data.as_ref(), &link).await {
        Ok(stat) => {
            let id = handle_id_for(context, &link, &stat);
            context.security.audit(&context.sec, "SYMLINK", &link, true, "");
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            nfs3::file::CREATE3resok {
                obj: Some(nfs3::nfs_fh3 { data: context.handles.encode(id) }),
                obj_attributes: Some(fattr3_from(&stat)),
                dir_wcc: wcc_since(context, dir_before, &dir).await,
            }
            .serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "SYMLINK", &link, false, "vfs error");
            vfs_stat3(e).serialize(output)?;
            wcc_since(context, dir_before, &dir).await.serialize(output)?;
        }
    }
    Ok(())
}
