//! File data and namespace operations: OPEN, CLOSE, READ, WRITE,
//! COMMIT, CREATE, REMOVE, RENAME and LINK.

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::access::{AccessMode, SharingMode};
use crate::protocol::nfs::{handle_id_for, name_stat4, resolve_handle, vfs_stat4};
use crate::protocol::rpc::Context;
use crate::protocol::xdr::nfs4::{self, change_info4, nfsstat4, state_owner4, stateid4};
use crate::protocol::xdr::{deserialize, Serialize};
use crate::security::{join_component, PERM_EXEC, PERM_READ, PERM_WRITE};
use crate::vfs::{FileKind, FileStat};

use super::{attrs, status_only, CompoundState, OpResult};

/// Directory change information for namespace mutations. The counters
/// derive from the directory ctime the same way the change attribute
/// does.
async fn change_info(context: &Context, dir: &Path, before: Option<FileStat>) -> change_info4 {
    let counter = |stat: &FileStat| (stat.ctime.seconds as u64) << 32 | stat.ctime.nanos as u64;
    let after = context.vfs.stat(dir).await.ok();
    change_info4 {
        atomic: false,
        before: before.as_ref().map(&counter).unwrap_or(0),
        after: after.as_ref().map(&counter).unwrap_or(0),
    }
}

/// Maps OPEN share arguments onto the access tracker's vocabulary.
fn share_modes(share_access: u32, share_deny: u32) -> (AccessMode, SharingMode) {
    let mode = match share_access & nfs4::OPEN4_SHARE_ACCESS_BOTH {
        nfs4::OPEN4_SHARE_ACCESS_READ => AccessMode::ReadOnly,
        nfs4::OPEN4_SHARE_ACCESS_WRITE => AccessMode::WriteOnly,
        _ => AccessMode::ReadWrite,
    };
    let sharing = match share_deny & nfs4::OPEN4_SHARE_DENY_BOTH {
        nfs4::OPEN4_SHARE_DENY_BOTH => SharingMode::Exclusive,
        nfs4::OPEN4_SHARE_DENY_WRITE => SharingMode::SharedRead,
        nfs4::OPEN4_SHARE_DENY_READ => SharingMode::SharedWrite,
        _ => SharingMode::SharedAll,
    };
    (mode, sharing)
}

fn owner_key(owner: &state_owner4) -> Vec<u8> {
    let mut key = owner.clientid.to_le_bytes().to_vec();
    key.extend_from_slice(&owner.owner);
    key
}

pub(super) async fn op_open(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let _seqid = deserialize::<u32>(input)?;
    let share_access = deserialize::<u32>(input)?;
    let share_deny = deserialize::<u32>(input)?;
    let owner = deserialize::<state_owner4>(input)?;

    // openflag4: NOCREATE, or CREATE with its createhow.
    let opentype = deserialize::<u32>(input)?;
    let (create, exclusive, create_attrs) = match opentype {
        0 => (false, false, None),
        1 => match deserialize::<u32>(input)? {
            0 => (true, false, Some(deserialize::<nfs4::fattr4>(input)?)),
            1 => (true, true, Some(deserialize::<nfs4::fattr4>(input)?)),
            2 => {
                let _verifier = deserialize::<[u8; 8]>(input)?;
                (true, true, None)
            }
            _ => return status_only(nfsstat4::NFS4ERR_INVAL),
        },
        _ => return status_only(nfsstat4::NFS4ERR_INVAL),
    };

    // open_claim4: only CLAIM_NULL (open by name) is served.
    let claim_type = deserialize::<u32>(input)?;
    if claim_type != 0 {
        return status_only(nfsstat4::NFS4ERR_NOTSUPP);
    }
    let name = deserialize::<Vec<u8>>(input)?;

    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    debug!("op_open({:?}, access={share_access:#x}, deny={share_deny:#x})",
           String::from_utf8_lossy(&name));

    let dir_perms = if create { PERM_EXEC | PERM_WRITE } else { PERM_EXEC };
    let (dir, _) = match resolve_handle(context, &fh, dir_perms, "OPEN").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    let dir_before = context.vfs.stat(&dir).await.ok();
    let path = match join_component(&dir, &name) {
        Ok(path) => path,
        Err(e) => {
            context.security.audit(&context.sec, "OPEN", &dir, false, "bad name component");
            return status_only(name_stat4(e));
        }
    };

    if create {
        let mode = create_attrs
            .as_ref()
            .and_then(|a| attrs::decode_settable(a).ok())
            .and_then(|s| s.mode)
            .unwrap_or(0o644);
        match context.vfs.create(&path, mode, exclusive).await {
            Ok(_) => {}
            Err(crate::vfs::VfsError::Exists) if !exclusive => {}
            Err(e) => return status_only(vfs_stat4(e)),
        }
    }

    let stat = match context.vfs.stat(&path).await {
        Ok(stat) => stat,
        Err(e) => return status_only(vfs_stat4(e)),
    };
    let file_perms = match share_access & nfs4::OPEN4_SHARE_ACCESS_BOTH {
        nfs4::OPEN4_SHARE_ACCESS_READ => PERM_READ,
        nfs4::OPEN4_SHARE_ACCESS_WRITE => PERM_WRITE,
        _ => PERM_READ | PERM_WRITE,
    };
    if !context.security.check_access(&context.sec, &path, file_perms, &stat) {
        context.security.audit(&context.sec, "OPEN", &path, false, "access denied");
        return status_only(nfsstat4::NFS4ERR_ACCESS);
    }

    let (mode, sharing) = share_modes(share_access, share_deny);
    if context.access.acquire(&path, &owner_key(&owner), mode, sharing).is_err() {
        context.security.audit(&context.sec, "OPEN", &path, false, "share conflict");
        return status_only(nfsstat4::NFS4ERR_SHARE_DENIED);
    }

    let id = handle_id_for(context, &path, &stat);
    context.handles.pin(id);
    let stateid = context.state.open(&path, owner, share_access, share_deny, id);
    context.security.audit(&context.sec, "OPEN", &path, true, "");

    cs.current_fh = Some(context.handles.encode(id));
    cs.current_stateid = Some(stateid.clone());

    let mut payload = Vec::new();
    stateid.serialize(&mut payload)?;
    change_info(context, &dir, dir_before).await.serialize(&mut payload)?;
    nfs4::OPEN4_RESULT_LOCKTYPE_POSIX.serialize(&mut payload)?;
    nfs4::bitmap4::new().serialize(&mut payload)?;
    nfs4::OPEN_DELEGATE_NONE.serialize(&mut payload)?;
    Ok((nfsstat4::NFS4_OK, payload))
}

pub(super) async fn op_close(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let _seqid = deserialize::<u32>(input)?;
    let stateid = deserialize::<stateid4>(input)?;
    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    if cs.current_fh.is_none() {
        return status_only(nfsstat4::NFS4ERR_NOFILEHANDLE);
    }

    match context.state.close(&stateid) {
        Ok(open) => {
            context.access.release(&open.path, &owner_key(&open.owner));
            context.handles.unpin(open.handle_id);
            context.security.audit(&context.sec, "CLOSE", &open.path, true, "");
            let mut payload = Vec::new();
            stateid4 { seqid: stateid.seqid.wrapping_add(1), other: stateid.other }
                .serialize(&mut payload)?;
            Ok((nfsstat4::NFS4_OK, payload))
        }
        Err(status) => status_only(status),
    }
}

pub(super) async fn op_read(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let stateid = deserialize::<stateid4>(input)?;
    let offset = deserialize::<u64>(input)?;
    let count = deserialize::<u32>(input)?;
    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (path, _) = match resolve_handle(context, &fh, PERM_READ, "READ").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    if let Err(status) = context.state.lookup_open(&stateid) {
        return status_only(status);
    }

    match context.vfs.read(&path, offset, count).await {
        Ok((data, eof)) => {
            context.security.audit(&context.sec, "READ", &path, true, "");
            let mut payload = Vec::new();
            eof.serialize(&mut payload)?;
            data.serialize(&mut payload)?;
            Ok((nfsstat4::NFS4_OK, payload))
        }
        Err(e) => {
            context.security.audit(&context.sec, "READ", &path, false, "vfs error");
            status_only(vfs_stat4(e))
        }
    }
}

pub(super) async fn op_write(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let stateid = deserialize::<stateid4>(input)?;
    let offset = deserialize::<u64>(input)?;
    let stable = deserialize::<u32>(input)?;
    let data = deserialize::<Vec<u8>>(input)?;
    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (path, _) = match resolve_handle(context, &fh, PERM_WRITE, "WRITE").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    match context.state.lookup_open(&stateid) {
        Ok(Some(open)) => context.access.touch(&path, &owner_key(&open.owner)),
        Ok(None) => {}
        Err(status) => return status_only(status),
    }

    // stable_how4: UNSTABLE4 = 0.
    let sync = stable != 0;
    match context.vfs.write(&path, offset, &data, sync).await {
        Ok(_) => {
            context.security.audit(&context.sec, "WRITE", &path, true, "");
            let mut payload = Vec::new();
            (data.len() as u32).serialize(&mut payload)?;
            stable.serialize(&mut payload)?;
            context.handles.boot_verifier().serialize(&mut payload)?;
            Ok((nfsstat4::NFS4_OK, payload))
        }
        Err(e) => {
            context.security.audit(&context.sec, "WRITE", &path, false, "vfs error");
            status_only(vfs_stat4(e))
        }
    }
}

pub(super) async fn op_commit(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let _offset = deserialize::<u64>(input)?;
    let _count = deserialize::<u32>(input)?;
    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (path, _) = match resolve_handle(context, &fh, PERM_WRITE, "COMMIT").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    match context.vfs.commit(&path).await {
        Ok(()) => {
            let mut payload = Vec::new();
            context.handles.boot_verifier().serialize(&mut payload)?;
            Ok((nfsstat4::NFS4_OK, payload))
        }
        Err(e) => status_only(vfs_stat4(e)),
    }
}

pub(super) async fn op_create(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    // createtype4 precedes the name.
    let objtype = deserialize::<u32>(input)?;
    let link_target = if objtype == nfs4::NF4LNK {
        Some(deserialize::<Vec<u8>>(input)?)
    } else {
        None
    };
    let devdata = if objtype == nfs4::NF4BLK || objtype == nfs4::NF4CHR {
        Some((deserialize::<u32>(input)?, deserialize::<u32>(input)?))
    } else {
        None
    };
    let name = deserialize::<Vec<u8>>(input)?;
    let create_attrs = deserialize::<nfs4::fattr4>(input)?;

    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (dir, _) = match resolve_handle(context, &fh, PERM_WRITE | PERM_EXEC, "CREATE").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    let dir_before = context.vfs.stat(&dir).await.ok();
    let path = match join_component(&dir, &name) {
        Ok(path) => path,
        Err(e) => {
            context.security.audit(&context.sec, "CREATE", &dir, false, "bad name component");
            return status_only(name_stat4(e));
        }
    };
    let set = match attrs::decode_settable(&create_attrs) {
        Ok(set) => set,
        Err(status) => return status_only(status),
    };
    let mode = set.mode.unwrap_or(0o755);

    // Regular files are created through OPEN, not CREATE.
    let created = match objtype {
        nfs4::NF4DIR => context.vfs.mkdir(&path, mode).await,
        nfs4::NF4LNK => {
            context.vfs.symlink(&link_target.unwrap_or_default(), &path).await
        }
        nfs4::NF4BLK => {
            context.vfs.mknod(&path, FileKind::Block, devdata.unwrap_or((0, 0)), mode).await
        }
        nfs4::NF4CHR => {
            context.vfs.mknod(&path, FileKind::Char, devdata.unwrap_or((0, 0)), mode).await
        }
        nfs4::NF4SOCK => context.vfs.mknod(&path, FileKind::Socket, (0, 0), mode).await,
        nfs4::NF4FIFO => context.vfs.mknod(&path, FileKind::Fifo, (0, 0), mode).await,
        _ => return status_only(nfsstat4::NFS4ERR_BADTYPE),
    };

    match created {
        Ok(stat) => {
            let id = handle_id_for(context, &path, &stat);
            cs.current_fh = Some(context.handles.encode(id));
            context.security.audit(&context.sec, "CREATE", &path, true, "");
            let mut payload = Vec::new();
            change_info(context, &dir, dir_before).await.serialize(&mut payload)?;
            create_attrs.attrmask.serialize(&mut payload)?;
            Ok((nfsstat4::NFS4_OK, payload))
        }
        Err(e) => {
            context.security.audit(&context.sec, "CREATE", &path, false, "vfs error");
            status_only(vfs_stat4(e))
        }
    }
}

pub(super) async fn op_remove(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let name = deserialize::<Vec<u8>>(input)?;
    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (dir, _) = match resolve_handle(context, &fh, PERM_WRITE | PERM_EXEC, "REMOVE").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    let dir_before = context.vfs.stat(&dir).await.ok();
    let path = match join_component(&dir, &name) {
        Ok(path) => path,
        Err(e) => {
            context.security.audit(&context.sec, "REMOVE", &dir, false, "bad name component");
            return status_only(name_stat4(e));
        }
    };

    let result = match context.vfs.stat(&path).await {
        Ok(stat) if stat.is_dir() => context.vfs.rmdir(&path).await,
        Ok(_) => context.vfs.remove(&path).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            context.handles.invalidate(&path);
            context.access.release_path(&path);
            context.security.audit(&context.sec, "REMOVE", &path, true, "");
            let mut payload = Vec::new();
            change_info(context, &dir, dir_before).await.serialize(&mut payload)?;
            Ok((nfsstat4::NFS4_OK, payload))
        }
        Err(e) => {
            context.security.audit(&context.sec, "REMOVE", &path, false, "vfs error");
            status_only(vfs_stat4(e))
        }
    }
}

pub(super) async fn op_rename(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let oldname = deserialize::<Vec<u8>>(input)?;
    let newname = deserialize::<Vec<u8>>(input)?;
    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    // The saved filehandle names the source directory, the current one
    // the target directory.
    let Some(saved) = cs.saved_fh.clone() else {
        return status_only(nfsstat4::NFS4ERR_NOFILEHANDLE);
    };
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };

    let (src_dir, _) = match resolve_handle(context, &saved, PERM_WRITE | PERM_EXEC, "RENAME")
        .await
    {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    let (dst_dir, _) = match resolve_handle(context, &fh, PERM_WRITE | PERM_EXEC, "RENAME").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    let src_before = context.vfs.stat(&src_dir).await.ok();
    let dst_before = context.vfs.stat(&dst_dir).await.ok();

    let (from, to) = match (
        join_component(&src_dir, &oldname),
        join_component(&dst_dir, &newname),
    ) {
        (Ok(from), Ok(to)) => (from, to),
        (Err(e), _) | (_, Err(e)) => {
            context.security.audit(&context.sec, "RENAME", &src_dir, false,
                                   "bad name component");
            return status_only(name_stat4(e));
        }
    };

    match context.vfs.rename(&from, &to).await {
        Ok(()) => {
            context.handles.invalidate(&from);
            context.handles.invalidate(&to);
            context.access.release_path(&from);
            context.security.audit(&context.sec, "RENAME", &from, true, "");
            let mut payload = Vec::new();
            change_info(context, &src_dir, src_before).await.serialize(&mut payload)?;
            change_info(context, &dst_dir, dst_before).await.serialize(&mut payload)?;
            Ok((nfsstat4::NFS4_OK, payload))
        }
        Err(e) => {
            context.security.audit(&context.sec, "RENAME", &from, false, "vfs error");
            status_only(vfs_stat4(e))
        }
    }
}

pub(super) async fn op_link(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let newname = deserialize::<Vec<u8>>(input)?;
    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    // Saved filehandle is the source object, current the target dir.
    let Some(saved) = cs.saved_fh.clone() else {
        return status_only(nfsstat4::NFS4ERR_NOFILEHANDLE);
    };
    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };

    let (existing, _) = match resolve_handle(context, &saved, PERM_READ, "LINK").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    let (dir, _) = match resolve_handle(context, &fh, PERM_WRITE | PERM_EXEC, "LINK").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    let dir_before = context.vfs.stat(&dir).await.ok();
    let link = match join_component(&dir, &newname) {
        Ok(link) => link,
        Err(e) => {
            context.security.audit(&context.sec, "LINK", &dir, false, "bad name component");
            return status_only(name_stat4(e));
        }
    };

    match context.vfs.link(&existing, &link).await {
        Ok(_) => {
            context.security.audit(&context.sec, "LINK", &link, true, "");
            let mut payload = Vec::new();
            change_info(context, &dir, dir_before).await.serialize(&mut payload)?;
            Ok((nfsstat4::NFS4_OK, payload))
        }
        Err(e) => {
            context.security.audit(&context.sec, "LINK", &link, false, "vfs error");
            status_only(vfs_stat4(e))
        }
    }
}
