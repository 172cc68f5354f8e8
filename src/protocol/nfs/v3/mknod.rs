//! NFSPROC3_MKNOD (procedure 11, RFC 1813 section 3.3.11): create a
//! device node, socket or FIFO. Backends that cannot express these
//! refuse with NOTSUPP.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{
    fattr3_from, handle_id_for, name_stat3, resolve_handle, vfs_stat3,
};
use crate::protocol::rpc;
use crate::protocol::xdr::nfs3::file::mknoddata3;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::{join_component, PERM_WRITE};
use crate::vfs::FileKind;

use super::wcc_since;

pub async fn nfsproc3_mknod(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::file::MKNOD3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_mknod({xid}, {:?})", args.r#where.name);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (dir, _) = match resolve_handle(context, &args.r#where.dir.data, PERM_WRITE, "MKNOD").await
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
            context.security.audit(&context.sec, "MKNOD", &dir, false, "bad name component");
            name_stat3(e).serialize(output)?;
            wcc_since(context, dir_before, &dir).await.serialize(output)?;
            return Ok(());
        }
    };

    let (kind, rdev, mode) = match &args.what {
        mknoddata3::Device(ftype, data) => {
            let kind = if *ftype == nfs3::ftype3::NF3BLK { FileKind::Block } else {
                FileKind::Char
            };
            (kind, (data.spec.specdata1, data.spec.specdata2),
             data.dev_attributes.mode.unwrap_or(0o600))
        }
        mknoddata3::PipeOrSocket(ftype, attrs) => {
            let kind =
                if *ftype == nfs3::ftype3::NF3SOCK { FileKind::Socket } else { FileKind::Fifo };
            (kind, (0, 0), attrs.mode.unwrap_or(0o600))
        }
    };

    match context.vfs.mknod(&path, kind, rdev, mode).await {
        Ok(stat) => {
            let id = handle_id_for(context, &path, &stat);
            context.security.audit(&context.sec, "MKNOD", &path, true, "");
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            nfs3::file::CREATE3resok {
                obj: Some(nfs3::nfs_fh3 { data: context.handles.encode(id) }),
                obj_attributes: Some(fattr3_from(&stat)),
                dir_wcc: wcc_since(context, dir_before, &dir).await,
            }
            .serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "MKNOD", &path, false, "vfs error");
            vfs_stat3(e).serialize(output)?;
            wcc_since(context, dir_before, &dir).await.serialize(output)?;
        }
    }
    Ok(())
}
