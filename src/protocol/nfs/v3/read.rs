//! NFSPROC3_READ (procedure 6, RFC 1813 section 3.3.6). The first read
//! by a client registers a shared-read record in the access tracker;
//! conflicting share modes refuse with ACCES.

use std::io::{Read, Write};

use tracing::debug;

use crate::access::{AccessMode, SharingMode};
use crate::protocol::nfs::{fattr3_from, resolve_handle, vfs_stat3};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::PERM_READ;

pub async fn nfsproc3_read(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::file::READ3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_read({xid}, offset={}, count={})", args.offset, args.count);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let path = match resolve_handle(context, &args.file.data, PERM_READ, "READ").await {
        Ok((path, _)) => path,
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };

    let owner = context.client_owner();
    if context
        .access
        .acquire(&path, &owner, AccessMode::ReadOnly, SharingMode::SharedRead)
        .is_err()
    {
        context.security.audit(&context.sec, "READ", &path, false, "share conflict");
        nfs3::nfsstat3::NFS3ERR_ACCES.serialize(output)?;
        nfs3::post_op_attr::None.serialize(output)?;
        return Ok(());
    }

    match context.vfs.read(&path, args.offset, args.count).await {
        Ok((data, eof)) => {
            let attr = super::post_attr(context, &path).await;
            context.security.audit(&context.sec, "READ", &path, true, "");
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            nfs3::file::READ3resok {
                file_attributes: attr,
                count: data.len() as u32,
                eof,
                data,
            }
            .serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "READ", &path, false, "vfs error");
            vfs_stat3(e).serialize(output)?;
            super::post_attr(context, &path).await.serialize(output)?;
        }
    }
    Ok(())
}
