//! NFSPROC3_CREATE (procedure 8, RFC 1813 section 3.3.8).
//!
//! GUARDED creates fail on an existing name, UNCHECKED creates succeed
//! and apply the supplied attributes. EXCLUSIVE carries a verifier
//! instead of attributes so a retransmitted create of the same file is
//! recognized rather than failed.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{
    fattr3_from, handle_id_for, name_stat3, resolve_handle, setattrs_from_sattr3, vfs_stat3,
};
use crate::protocol::rpc;
use crate::protocol::xdr::nfs3::file::createhow3;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::{join_component, PERM_WRITE};
use crate::vfs::VfsError;

use super::wcc_since;

pub async fn nfsproc3_create(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::file::CREATE3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_create({xid}, {:?})", args.r#where.name);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (dir, _) = match resolve_handle(context, &args.r#where.dir.data, PERM_WRITE, "CREATE")
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

    let path = match join_component(&dir, &args.r#where.name) {
        Ok(path) => path,
        Err(e) => {
            context.security.audit(&context.sec, "CREATE", &dir, false, "bad name component");
            name_stat3(e).serialize(output)?;
            wcc_since(context, dir_before, &dir).await.serialize(output)?;
            return Ok(());
        }
    };

    let (sattr, exclusive) = match &args.how {
        createhow3::UNCHECKED(sattr) => (Some(*sattr), false),
        createhow3::GUARDED(sattr) => (Some(*sattr), true),
        createhow3::EXCLUSIVE(_verifier) => (None, true),
    };
    let mode = sattr.and_then(|s| s.mode).unwrap_or(0o644);

    let created = match context.vfs.create(&path, mode, exclusive).await {
        Ok(stat) => Ok(stat),
        // A retried EXCLUSIVE create of the same name is idempotent.
        Err(VfsError::Exists) if matches!(args.how, createhow3::EXCLUSIVE(_)) => {
            context.vfs.stat(&path).await
        }
        Err(e) => Err(e),
    };

    match created {
        Ok(_) => {
            if let Some(sattr) = sattr {
                let _ = context.vfs.setattr(&path, &setattrs_from_sattr3(&sattr)).await;
            }
            let stat = context.vfs.stat(&path).await.unwrap_or_default();
            let id = handle_id_for(context, &path, &stat);
            context.security.audit(&context.sec, "CREATE", &path, true, "");
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            nfs3::file::CREATE3resok {
                obj: Some(nfs3::nfs_fh3 { data: context.handles.encode(id) }),
                obj_attributes: Some(fattr3_from(&stat)),
                dir_wcc: wcc_since(context, dir_before, &dir).await,
            }
            .serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "CREATE", &path, false, "vfs error");
            vfs_stat3(e).serialize(output)?;
            wcc_since(context, dir_before, &dir).await.serialize(output)?;
        }
    }
    Ok(())
}
