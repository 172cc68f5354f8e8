//! NFSPROC3_LINK (procedure 15, RFC 1813 section 3.3.15).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{name_stat3, resolve_handle, vfs_stat3};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::{join_component, PERM_READ, PERM_WRITE};

use super::{post_attr, wcc_since};

pub async fn nfsproc3_link(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::file::LINK3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_link({xid}, {:?})", args.link.name);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (existing, _) = match resolve_handle(context, &args.file.data, PERM_READ, "LINK").await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let (link_dir, _) =
        match resolve_handle(context, &args.link.dir.data, PERM_WRITE, "LINK").await {
            Ok(resolved) => resolved,
            Err(e) => {
                e.as_stat3().serialize(output)?;
                post_attr(context, &existing).await.serialize(output)?;
                nfs3::wcc_data::default().serialize(output)?;
                return Ok(());
            }
        };
    let dir_before = super::pre_attr(context, &link_dir).await;

    let link = match join_component(&link_dir, &args.link.name) {
        Ok(link) => link,
        Err(e) => {
            context.security.audit(&context.sec, "LINK", &link_dir, false, "bad name component");
            name_stat3(e).serialize(output)?;
            post_attr(context, &existing).await.serialize(output)?;
            wcc_since(context, dir_before, &link_dir).await.serialize(output)?;
            return Ok(());
        }
    };

    match context.vfs.link(&existing, &link).await {
        Ok(_) => {
            context.security.audit(&context.sec, "LINK", &link, true, "");
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "LINK", &link, false, "vfs error");
            vfs_stat3(e).serialize(output)?;
        }
    }
    post_attr(context, &existing).await.serialize(output)?;
    wcc_since(context, dir_before, &link_dir).await.serialize(output)?;
    Ok(())
}
