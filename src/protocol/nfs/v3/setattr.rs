//! NFSPROC3_SETATTR (procedure 2, RFC 1813 section 3.3.2).

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{
    fattr3_from, nfstime3_from, resolve_handle, setattrs_from_sattr3, vfs_stat3,
};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::PERM_WRITE;

use super::wcc_since;

pub async fn nfsproc3_setattr(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::file::SETATTR3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_setattr({xid})");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (path, stat) = match resolve_handle(context, &args.object.data, PERM_WRITE, "SETATTR")
        .await
    {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let before: nfs3::pre_op_attr = Some(nfs3::wcc_attr::from(fattr3_from(&stat)));

    // The guard makes the change conditional on the ctime the client
    // last observed.
    if let Some(guard_ctime) = args.guard {
        if nfstime3_from(stat.ctime) != guard_ctime {
            nfs3::nfsstat3::NFS3ERR_NOT_SYNC.serialize(output)?;
            wcc_since(context, before, &path).await.serialize(output)?;
            return Ok(());
        }
    }

    match context.vfs.setattr(&path, &setattrs_from_sattr3(&args.new_attributes)).await {
        Ok(_) => {
            context.security.audit(&context.sec, "SETATTR", &path, true, "");
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            wcc_since(context, before, &path).await.serialize(output)?;
        }
        Err(e) => {
            context.security.audit(&context.sec, "SETATTR", &path, false, "vfs error");
            vfs_stat3(e).serialize(output)?;
            wcc_since(context, before, &path).await.serialize(output)?;
        }
    }
    Ok(())
}
