//! Attribute and directory operations: ACCESS, GETATTR, SETATTR,
//! READDIR, READLINK, GETACL and SETACL.

use std::io::Read;

use tracing::debug;

use crate::protocol::nfs::{resolve_handle, vfs_stat4};
use crate::protocol::rpc::Context;
use crate::protocol::xdr::nfs4::{self, bitmap4, fattr4, nfsstat4};
use crate::protocol::xdr::{deserialize, Serialize};
use crate::security::{AclEntry, AclKind, FileAcl, PERM_EXEC, PERM_READ, PERM_WRITE};

use super::{attrs, status_only, CompoundState, OpResult};

pub(super) async fn op_access(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let requested = deserialize::<u32>(input)?;
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (path, stat) = match resolve_handle(context, &fh, 0, "ACCESS").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };

    let allowed = |perm| context.security.check_access(&context.sec, &path, perm, &stat);
    let mut supported = nfs4::ACCESS4_READ | nfs4::ACCESS4_LOOKUP | nfs4::ACCESS4_MODIFY
        | nfs4::ACCESS4_EXTEND | nfs4::ACCESS4_DELETE;
    if !stat.is_dir() {
        supported = (supported & !(nfs4::ACCESS4_LOOKUP)) | nfs4::ACCESS4_EXECUTE;
    }
    let mut granted = 0;
    if requested & nfs4::ACCESS4_READ != 0 && allowed(PERM_READ) {
        granted |= nfs4::ACCESS4_READ;
    }
    if requested & nfs4::ACCESS4_LOOKUP != 0 && stat.is_dir() && allowed(PERM_EXEC) {
        granted |= nfs4::ACCESS4_LOOKUP;
    }
    if requested & (nfs4::ACCESS4_MODIFY | nfs4::ACCESS4_EXTEND | nfs4::ACCESS4_DELETE) != 0
        && allowed(PERM_WRITE)
    {
        granted |= requested & (nfs4::ACCESS4_MODIFY | nfs4::ACCESS4_EXTEND
                                | nfs4::ACCESS4_DELETE);
    }
    if requested & nfs4::ACCESS4_EXECUTE != 0 && !stat.is_dir() && allowed(PERM_EXEC) {
        granted |= nfs4::ACCESS4_EXECUTE;
    }

    let mut payload = Vec::new();
    (supported & requested).serialize(&mut payload)?;
    granted.serialize(&mut payload)?;
    Ok((nfsstat4::NFS4_OK, payload))
}

pub(super) async fn op_getattr(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let requested = deserialize::<bitmap4>(input)?;
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (_, stat) = match resolve_handle(context, &fh, 0, "GETATTR").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };

    let lease = context.config.session_timeout.as_secs().min(u32::MAX as u64) as u32;
    let attrs = attrs::encode_fattr4(&requested, &stat, &fh, lease)?;
    let mut payload = Vec::new();
    attrs.serialize(&mut payload)?;
    Ok((nfsstat4::NFS4_OK, payload))
}

pub(super) async fn op_setattr(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let _stateid = deserialize::<nfs4::stateid4>(input)?;
    let wire_attrs = deserialize::<fattr4>(input)?;
    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };

    // The attrsset bitmap is returned on failure too.
    let fail = |status: nfsstat4| -> OpResult {
        let mut payload = Vec::new();
        bitmap4::new().serialize(&mut payload)?;
        Ok((status, payload))
    };

    let (path, _) = match resolve_handle(context, &fh, PERM_WRITE, "SETATTR").await {
        Ok(resolved) => resolved,
        Err(e) => return fail(e.as_stat4()),
    };
    let set = match attrs::decode_settable(&wire_attrs) {
        Ok(set) => set,
        Err(status) => return fail(status),
    };
    match context.vfs.setattr(&path, &set).await {
        Ok(_) => {
            context.security.audit(&context.sec, "SETATTR", &path, true, "");
            let mut payload = Vec::new();
            wire_attrs.attrmask.serialize(&mut payload)?;
            Ok((nfsstat4::NFS4_OK, payload))
        }
        Err(e) => {
            context.security.audit(&context.sec, "SETATTR", &path, false, "vfs error");
            fail(vfs_stat4(e))
        }
    }
}

pub(super) async fn op_readdir(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let cookie = deserialize::<u64>(input)?;
    let cookieverf = deserialize::<[u8; 8]>(input)?;
    let _dircount = deserialize::<u32>(input)?;
    let maxcount = deserialize::<u32>(input)?;
    let requested = deserialize::<bitmap4>(input)?;

    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (path, stat) = match resolve_handle(context, &fh, PERM_READ, "READDIR").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    if !stat.is_dir() {
        return status_only(nfsstat4::NFS4ERR_NOTDIR);
    }

    let verifier = context.handles.boot_verifier();
    if cookie != 0 && cookieverf != [0; 8] && cookieverf != verifier {
        return status_only(nfsstat4::NFS4ERR_BAD_COOKIE);
    }

    let entries = match context.vfs.readdir(&path).await {
        Ok(entries) => entries,
        Err(e) => return status_only(vfs_stat4(e)),
    };
    let start = cookie as usize;
    if start > entries.len() {
        return status_only(nfsstat4::NFS4ERR_BAD_COOKIE);
    }

    let lease = context.config.session_timeout.as_secs().min(u32::MAX as u64) as u32;
    let mut payload = Vec::new();
    verifier.serialize(&mut payload)?;

    let mut budget = maxcount.saturating_sub(128);
    let mut index = start;
    for entry in entries.iter().skip(start) {
        let child = path.join(String::from_utf8_lossy(&entry.name).as_ref());
        let id = crate::protocol::nfs::handle_id_for(context, &child, &entry.stat);
        let child_fh = context.handles.encode(id);
        let attrs = attrs::encode_fattr4(&requested, &entry.stat, &child_fh, lease)?;

        let mut encoded = Vec::new();
        ((index + 1) as u64).serialize(&mut encoded)?;
        entry.name.clone().serialize(&mut encoded)?;
        attrs.serialize(&mut encoded)?;

        if encoded.len() as u32 + 8 > budget {
            break;
        }
        budget -= encoded.len() as u32 + 8;
        index += 1;
        true.serialize(&mut payload)?;
        payload.extend_from_slice(&encoded);
    }
    false.serialize(&mut payload)?;
    (index >= entries.len()).serialize(&mut payload)?;
    debug!("op_readdir: {} entries from {start}", index - start);
    Ok((nfsstat4::NFS4_OK, payload))
}

pub(super) async fn op_readlink(cs: &mut CompoundState, context: &Context) -> OpResult {
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (path, _) = match resolve_handle(context, &fh, PERM_READ, "READLINK").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    match context.vfs.readlink(&path).await {
        Ok(target) => {
            let mut payload = Vec::new();
            target.serialize(&mut payload)?;
            Ok((nfsstat4::NFS4_OK, payload))
        }
        Err(e) => status_only(vfs_stat4(e)),
    }
}

pub(super) async fn op_getacl(cs: &mut CompoundState, context: &Context) -> OpResult {
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (path, stat) = match resolve_handle(context, &fh, PERM_READ, "GETACL").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };

    // Files without a stored ACL report one synthesized from the mode
    // bits so clients always see a well-formed list.
    let acl = context.security.get_acl(&path).unwrap_or_else(|| FileAcl {
        entries: vec![
            AclEntry {
                kind: AclKind::User,
                id: stat.uid,
                permissions: (stat.mode >> 6) & 7,
                name: None,
            },
            AclEntry {
                kind: AclKind::Group,
                id: stat.gid,
                permissions: (stat.mode >> 3) & 7,
                name: None,
            },
            AclEntry { kind: AclKind::Other, id: 0, permissions: stat.mode & 7, name: None },
        ],
        default_mask: 7,
        is_directory: stat.is_dir(),
    });

    let mut payload = Vec::new();
    acl.serialize(&mut payload)?;
    Ok((nfsstat4::NFS4_OK, payload))
}

pub(super) async fn op_setacl(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let acl = deserialize::<FileAcl>(input)?;
    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (path, stat) = match resolve_handle(context, &fh, PERM_WRITE, "SETACL").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };

    // Only the owner (or root) may replace the ACL.
    if context.sec.uid != 0 && context.sec.uid != stat.uid {
        context.security.audit(&context.sec, "SETACL", &path, false, "not owner");
        return status_only(nfsstat4::NFS4ERR_PERM);
    }
    // A stored ACL must carry exactly one owner entry and one other
    // entry.
    let owner_entries = acl
        .entries
        .iter()
        .filter(|e| e.kind == AclKind::User && e.id == stat.uid)
        .count();
    let other_entries = acl.entries.iter().filter(|e| e.kind == AclKind::Other).count();
    if owner_entries != 1 || other_entries != 1 || !acl.is_well_formed() {
        return status_only(nfsstat4::NFS4ERR_INVAL);
    }

    if !context.security.set_acl(&path, acl) {
        return status_only(nfsstat4::NFS4ERR_INVAL);
    }
    context.security.audit(&context.sec, "SETACL", &path, true, "");
    Ok((nfsstat4::NFS4_OK, Vec::new()))
}
