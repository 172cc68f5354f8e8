//! Client identity and session operations: EXCHANGE_ID, CREATE_SESSION,
//! DESTROY_SESSION, DESTROY_CLIENTID, RECLAIM_COMPLETE, RENEW, the
//! delegation stubs, and GETDEVICEINFO which always reports that no
//! device exists.

use std::io::{Read, Write as _};

use tracing::{debug, info};

use crate::protocol::rpc::Context;
use crate::protocol::xdr::nfs4::{
    self, channel_attrs4, nfsstat4, sessionid4, stateid4, SEQUENCE4args,
};
use crate::protocol::xdr::{deserialize, Serialize};
use crate::state::{SESSION_MAX_OPS, SESSION_SLOTS};

use super::{status_only, CompoundState, OpResult};

/// Encodes the SEQUENCE result body after a successful slot check.
pub(super) fn encode_sequence_ok(
    args: &SEQUENCE4args,
    out: &mut Vec<u8>,
) -> std::io::Result<()> {
    args.sessionid.serialize(out)?;
    args.sequenceid.serialize(out)?;
    args.slotid.serialize(out)?;
    (SESSION_SLOTS - 1).serialize(out)?; // highest_slotid
    (SESSION_SLOTS - 1).serialize(out)?; // target_highest_slotid
    0_u32.serialize(out) // status flags
}

pub(super) fn op_exchange_id(input: &mut impl Read, context: &Context) -> OpResult {
    // client_owner4
    let co_verifier = deserialize::<[u8; 8]>(input)?;
    let co_ownerid = deserialize::<Vec<u8>>(input)?;
    let _flags = deserialize::<u32>(input)?;
    // state_protect4_a: only SP4_NONE is served.
    let state_protect = deserialize::<u32>(input)?;
    if state_protect != 0 {
        return status_only(nfsstat4::NFS4ERR_NOTSUPP);
    }
    // Optional client implementation id.
    let impl_count = deserialize::<u32>(input)?;
    for _ in 0..impl_count.min(1) {
        let _domain = deserialize::<Vec<u8>>(input)?;
        let _name = deserialize::<Vec<u8>>(input)?;
        let _secs = deserialize::<i64>(input)?;
        let _nsecs = deserialize::<u32>(input)?;
    }

    let clientid = context.state.exchange_id(&co_ownerid, co_verifier);
    debug!(clientid, "exchange_id");

    let mut payload = Vec::new();
    clientid.serialize(&mut payload)?;
    1_u32.serialize(&mut payload)?; // sequenceid
    0_u32.serialize(&mut payload)?; // flags
    0_u32.serialize(&mut payload)?; // state_protect: SP4_NONE
    // server_owner4
    0_u64.serialize(&mut payload)?;
    context.state.server_verifier().to_vec().serialize(&mut payload)?;
    // server scope and implementation id
    Vec::<u8>::new().serialize(&mut payload)?;
    0_u32.serialize(&mut payload)?;
    Ok((nfsstat4::NFS4_OK, payload))
}

pub(super) fn op_create_session(input: &mut impl Read, context: &Context) -> OpResult {
    let clientid = deserialize::<u64>(input)?;
    let sequence = deserialize::<u32>(input)?;
    let _flags = deserialize::<u32>(input)?;
    let fore_chan = deserialize::<channel_attrs4>(input)?;
    let _back_chan = deserialize::<channel_attrs4>(input)?;
    let _cb_program = deserialize::<u32>(input)?;
    // callback security parms; AUTH_NONE and AUTH_SYS bodies occur.
    let sec_count = deserialize::<u32>(input)?;
    for _ in 0..sec_count {
        match deserialize::<u32>(input)? {
            0 => {}
            1 => {
                let _stamp = deserialize::<u32>(input)?;
                let _machine = deserialize::<Vec<u8>>(input)?;
                let _uid = deserialize::<u32>(input)?;
                let _gid = deserialize::<u32>(input)?;
                let _gids = deserialize::<Vec<u32>>(input)?;
            }
            _ => return status_only(nfsstat4::NFS4ERR_NOTSUPP),
        }
    }

    let session_id = match context.state.create_session(clientid) {
        Ok(id) => id,
        Err(status) => return status_only(status),
    };
    info!(clientid, "created session");

    let granted = channel_attrs4 {
        ca_headerpadsize: 0,
        ca_maxrequestsize: fore_chan
            .ca_maxrequestsize
            .min(context.config.max_request_size as u32),
        ca_maxresponsesize: fore_chan
            .ca_maxresponsesize
            .min(context.config.max_request_size as u32),
        ca_maxresponsesize_cached: fore_chan.ca_maxresponsesize_cached.min(64 * 1024),
        ca_maxoperations: fore_chan.ca_maxoperations.min(SESSION_MAX_OPS),
        ca_maxrequests: fore_chan.ca_maxrequests.min(SESSION_SLOTS),
        ca_rdma_ird: Vec::new(),
    };

    let mut payload = Vec::new();
    payload.write_all(&session_id)?;
    sequence.serialize(&mut payload)?;
    0_u32.serialize(&mut payload)?; // flags
    granted.serialize(&mut payload)?; // fore channel
    granted.serialize(&mut payload)?; // back channel
    Ok((nfsstat4::NFS4_OK, payload))
}

pub(super) fn op_destroy_session(input: &mut impl Read, context: &Context) -> OpResult {
    let mut session_id: sessionid4 = [0; nfs4::NFS4_SESSIONID_SIZE];
    input.read_exact(&mut session_id)?;
    if context.state.destroy_session(&session_id) {
        status_only(nfsstat4::NFS4_OK)
    } else {
        status_only(nfsstat4::NFS4ERR_BADSESSION)
    }
}

pub(super) fn op_destroy_clientid(input: &mut impl Read, context: &Context) -> OpResult {
    let clientid = deserialize::<u64>(input)?;
    status_only(context.state.destroy_clientid(clientid))
}

pub(super) fn op_reclaim_complete(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let _one_fs = deserialize::<bool>(input)?;
    let Some(clientid) = cs.client_id else {
        return status_only(nfsstat4::NFS4ERR_OP_NOT_IN_SESSION);
    };
    status_only(context.state.reclaim_complete(clientid))
}

pub(super) fn op_renew(input: &mut impl Read, context: &Context) -> OpResult {
    let clientid = deserialize::<u64>(input)?;
    status_only(context.state.renew(clientid))
}

pub(super) async fn op_delegpurge(
    _cs: &mut CompoundState,
    input: &mut impl Read,
    _context: &Context,
) -> OpResult {
    let _clientid = deserialize::<u64>(input)?;
    status_only(nfsstat4::NFS4ERR_NOTSUPP)
}

pub(super) async fn op_delegreturn(
    cs: &mut CompoundState,
    input: &mut impl Read,
    context: &Context,
) -> OpResult {
    let stateid = deserialize::<stateid4>(input)?;
    if let Err(status) = cs.require_session() {
        return status_only(status);
    }
    status_only(context.state.delegreturn(&stateid))
}

/// Single-server pNFS stance: there are no layout devices to describe.
pub(super) fn op_getdeviceinfo(input: &mut impl Read) -> OpResult {
    let mut device_id = [0_u8; 16];
    input.read_exact(&mut device_id)?;
    let _layout_type = deserialize::<u32>(input)?;
    let _maxcount = deserialize::<u32>(input)?;
    let _notify = deserialize::<Vec<u32>>(input)?;
    status_only(nfsstat4::NFS4ERR_NOENT)
}
