//! Filehandle operations: PUTFH, PUTROOTFH/PUTPUBFH, GETFH, SAVEFH,
//! RESTOREFH, LOOKUP, LOOKUPP and SECINFO.

use std::io::Read;

use tracing::debug;

use crate::handle::HandleError;
use crate::protocol::nfs::{handle_id_for, name_stat4, resolve_handle, vfs_stat4};
use crate::protocol::rpc::Context;
use crate::protocol::xdr::nfs4::nfsstat4;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::security::{join_component, PERM_EXEC};

use super::{status_only, CompoundState, OpResult};

pub(super) fn op_putfh(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let fh = deserialize::<Vec<u8>>(input)?;
    // The handle must at least decode; a malformed or all-zero handle
    // is refused here rather than on first use.
    match context.handles.resolve(&fh) {
        Ok(_) => {
            cs.current_fh = Some(fh);
            status_only(nfsstat4::NFS4_OK)
        }
        Err(HandleError::Bad) => status_only(nfsstat4::NFS4ERR_BADHANDLE),
        Err(HandleError::Stale) => status_only(nfsstat4::NFS4ERR_STALE),
    }
}

pub(super) async fn op_putrootfh(cs: &mut CompoundState, context: &Context) -> OpResult {
    let root = context.config.root_path.clone();
    let stat = match context.vfs.stat(&root).await {
        Ok(stat) => stat,
        Err(e) => return status_only(vfs_stat4(e)),
    };
    let id = handle_id_for(context, &root, &stat);
    cs.current_fh = Some(context.handles.encode(id));
    status_only(nfsstat4::NFS4_OK)
}

pub(super) fn op_getfh(cs: &mut CompoundState) -> OpResult {
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let mut payload = Vec::new();
    fh.serialize(&mut payload)?;
    Ok((nfsstat4::NFS4_OK, payload))
}

pub(super) fn op_savefh(cs: &mut CompoundState) -> OpResult {
    match cs.current_fh.clone() {
        Some(fh) => {
            cs.saved_fh = Some(fh);
            status_only(nfsstat4::NFS4_OK)
        }
        None => status_only(nfsstat4::NFS4ERR_NOFILEHANDLE),
    }
}

pub(super) fn op_restorefh(cs: &mut CompoundState) -> OpResult {
    match cs.saved_fh.clone() {
        Some(fh) => {
            cs.current_fh = Some(fh);
            status_only(nfsstat4::NFS4_OK)
        }
        None => status_only(nfsstat4::NFS4ERR_RESTOREFH),
    }
}

pub(super) async fn op_lookup(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let name = deserialize::<Vec<u8>>(input)?;
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    debug!("op_lookup({:?})", String::from_utf8_lossy(&name));

    let (dir, dir_stat) = match resolve_handle(context, &fh, PERM_EXEC, "LOOKUP").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    if !dir_stat.is_dir() {
        return status_only(nfsstat4::NFS4ERR_NOTDIR);
    }

    let path = match join_component(&dir, &name) {
        Ok(path) => path,
        Err(e) => {
            context.security.audit(&context.sec, "LOOKUP", &dir, false, "bad name component");
            return status_only(name_stat4(e));
        }
    };
    match context.vfs.stat(&path).await {
        Ok(stat) => {
            let id = handle_id_for(context, &path, &stat);
            cs.current_fh = Some(context.handles.encode(id));
            status_only(nfsstat4::NFS4_OK)
        }
        Err(e) => status_only(vfs_stat4(e)),
    }
}

pub(super) async fn op_lookupp(cs: &mut CompoundState, context: &Context) -> OpResult {
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (path, _) = match resolve_handle(context, &fh, PERM_EXEC, "LOOKUPP").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    if path == context.config.root_path {
        return status_only(nfsstat4::NFS4ERR_NOENT);
    }
    let Some(parent) = path.parent().map(|p| p.to_path_buf()) else {
        return status_only(nfsstat4::NFS4ERR_NOENT);
    };
    match context.vfs.stat(&parent).await {
        Ok(stat) => {
            let id = handle_id_for(context, &parent, &stat);
            cs.current_fh = Some(context.handles.encode(id));
            status_only(nfsstat4::NFS4_OK)
        }
        Err(e) => status_only(vfs_stat4(e)),
    }
}

/// SECINFO reports the auth flavors usable for a name. This server
/// accepts AUTH_SYS everywhere and AUTH_NONE when anonymous access is
/// enabled. Per the protocol, the current filehandle is consumed.
pub(super) async fn op_secinfo(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let name = deserialize::<Vec<u8>>(input)?;
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (dir, _) = match resolve_handle(context, &fh, PERM_EXEC, "SECINFO").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    if join_component(&dir, &name).is_err() {
        return status_only(nfsstat4::NFS4ERR_BADNAME);
    }

    let mut flavors: Vec<u32> = vec![1]; // AUTH_SYS
    if context.config.anonymous_access {
        flavors.push(0); // AUTH_NONE
    }

    let mut payload = Vec::new();
    (flavors.len() as u32).serialize(&mut payload)?;
    for flavor in flavors {
        flavor.serialize(&mut payload)?;
    }
    cs.current_fh = None;
    Ok((nfsstat4::NFS4_OK, payload))
}
