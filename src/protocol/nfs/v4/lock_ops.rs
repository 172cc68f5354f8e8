//! Byte-range locking: LOCK, LOCKT, LOCKU and RELEASE_LOCKOWNER.
//! Locks are advisory and tracked in the state table; conflicts answer
//! NFS4ERR_DENIED with the blocking range.

use std::io::Read;

use crate::protocol::nfs::resolve_handle;
use crate::protocol::rpc::Context;
use crate::protocol::xdr::nfs4::{nfsstat4, state_owner4, stateid4};
use crate::protocol::xdr::{deserialize, Serialize};
use crate::security::PERM_READ;
use crate::state::LockRange;

use super::{status_only, CompoundState, OpResult};

fn encode_denied(range: &LockRange, owner: state_owner4) -> std::io::Result<Vec<u8>> {
    let mut payload = Vec::new();
    range.offset.serialize(&mut payload)?;
    range.length.serialize(&mut payload)?;
    range.locktype.serialize(&mut payload)?;
    owner.serialize(&mut payload)?;
    Ok(payload)
}

pub(super) async fn op_lock(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let locktype = deserialize::<u32>(input)?;
    let _reclaim = deserialize::<bool>(input)?;
    let offset = deserialize::<u64>(input)?;
    let length = deserialize::<u64>(input)?;

    // locker4: a new lock-owner rides on an open stateid, an existing
    // one names its lock stateid.
    let new_lock_owner = deserialize::<bool>(input)?;
    let (stateid, owner) = if new_lock_owner {
        let _open_seqid = deserialize::<u32>(input)?;
        let open_stateid = deserialize::<stateid4>(input)?;
        let _lock_seqid = deserialize::<u32>(input)?;
        let owner = deserialize::<state_owner4>(input)?;
        (open_stateid, owner)
    } else {
        let lock_stateid = deserialize::<stateid4>(input)?;
        let _lock_seqid = deserialize::<u32>(input)?;
        (lock_stateid, state_owner4::default())
    };

    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    if cs.current_fh.is_none() {
        return status_only(nfsstat4::NFS4ERR_NOFILEHANDLE);
    }
    if length == 0 {
        return status_only(nfsstat4::NFS4ERR_INVAL);
    }

    match context.state.lock(&stateid, locktype, offset, length) {
        Ok(lock_stateid) => {
            let mut payload = Vec::new();
            lock_stateid.serialize(&mut payload)?;
            Ok((nfsstat4::NFS4_OK, payload))
        }
        Err(range) => {
            let payload = encode_denied(&range, owner)?;
            Ok((nfsstat4::NFS4ERR_DENIED, payload))
        }
    }
}

pub(super) async fn op_lockt(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let locktype = deserialize::<u32>(input)?;
    let offset = deserialize::<u64>(input)?;
    let length = deserialize::<u64>(input)?;
    let owner = deserialize::<state_owner4>(input)?;

    let fh = match cs.require_fh() {
        Ok(fh) => fh.to_vec(),
        Err(status) => return status_only(status),
    };
    let (path, _) = match resolve_handle(context, &fh, PERM_READ, "LOCKT").await {
        Ok(resolved) => resolved,
        Err(e) => return status_only(e.as_stat4()),
    };
    if length == 0 {
        return status_only(nfsstat4::NFS4ERR_INVAL);
    }

    match context.state.test_lock(&path, &owner, locktype, offset, length) {
        None => status_only(nfsstat4::NFS4_OK),
        Some(range) => {
            let payload = encode_denied(&range, owner)?;
            Ok((nfsstat4::NFS4ERR_DENIED, payload))
        }
    }
}

pub(super) async fn op_locku(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let _locktype = deserialize::<u32>(input)?;
    let _seqid = deserialize::<u32>(input)?;
    let stateid = deserialize::<stateid4>(input)?;
    let offset = deserialize::<u64>(input)?;
    let length = deserialize::<u64>(input)?;

    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    if cs.current_fh.is_none() {
        return status_only(nfsstat4::NFS4ERR_NOFILEHANDLE);
    }

    match context.state.unlock(&stateid, offset, length) {
        nfsstat4::NFS4_OK => {
            let mut payload = Vec::new();
            stateid4 { seqid: stateid.seqid.wrapping_add(1), other: stateid.other }
                .serialize(&mut payload)?;
            Ok((nfsstat4::NFS4_OK, payload))
        }
        status => status_only(status),
    }
}

pub(super) fn op_release_lockowner(input: &mut impl Read) -> OpResult {
    let _owner = deserialize::<state_owner4>(input)?;
    status_only(nfsstat4::NFS4_OK)
}
