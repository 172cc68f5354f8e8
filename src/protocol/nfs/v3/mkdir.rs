//! NFSPROC3_MKDIR (procedure 9, RFC 1813 section 3.3.9).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{
    fattr3_from, handle_id_for, name_stat3, resolve_handle, vfs_stat3,
};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::{join_component, PERM_WRITE};

use super::wcc_since;

pub async fn nfsproc3_mkdir(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::file::MKDIR3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_mkdir({xid}, {:?})", args.r#where.name);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (dir, _) = match resolve_handle(context, &args.r#where.dir.data, PERM_WRITE, "MKDIR").await
    {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let dir_before = super::pre_attr(context, &dir).await;

    let path = match join_component(&dir, &args.r#where.name) {
        Ok(path) => path,
        Err(e) => {
            context.security.audit(&context.sec, "MKDIR", &dir, false, "bad name component");
            name_stat3(e).serialize(output)?;
            wcc_since(context, dir_before, &dir).await.serialize(output)?;
            return Ok(());
        }
    };

    let mode = args.attributes.mode.unwrap_or(0o755);
    match context.vfs.mkdir(&path, mode).await {
        Ok(stat) => {
            let id = handle_id_for(context, &path, &stat);
            context.security.audit(&context.sec, "MKDIR", &path, true, "");
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            nfs3::file::CREATE3resok {
                obj: Some(nfs3::nfs_fh3 { data: context.handles.encode(id) }),
                obj_attributes: Some(fattr3_from(&stat)),
                dir_wcc: wcc_since(context, dir_before, &dir).await,
            }
            .serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "MKDIR", &path, false, "vfs error");
            vfs_stat3(e).serialize(output)?;
            wcc_since(context, dir_before, &dir).await.serialize(output)?;
        }
    }
    Ok(())
}
