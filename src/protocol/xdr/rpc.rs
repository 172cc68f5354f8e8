//! ONC-RPC version 2 message types as defined in RFC 5531.
//!
//! Covers the call/reply envelope, the authentication structures for the
//! flavors this server understands, and constructors for the canned reply
//! shapes the dispatcher emits (accept errors, rejections, auth failures).

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::*;

/// RPC protocol version implemented by this server.
pub const RPC_VERSION: u32 = 2;

/// Maximum number of auxiliary group ids in AUTH_SYS credentials.
pub const AUTH_SYS_MAX_GIDS: usize = 16;

/// Why the server refused to authenticate a caller.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum auth_stat {
    /// Credential structure was malformed or of a flavor the server
    /// does not accept for the requested operation.
    #[default]
    AUTH_BADCRED = 1,
    /// Credentials rejected; the client must begin a new session.
    AUTH_REJECTEDCRED = 2,
    /// Verifier was malformed.
    AUTH_BADVERF = 3,
    /// Verifier expired or replayed.
    AUTH_REJECTEDVERF = 4,
    /// Flavor too weak for the requested operation.
    AUTH_TOOWEAK = 5,
    /// Reply verifier from the server was invalid (client side).
    AUTH_INVALIDRESP = 6,
    /// Unknown failure.
    AUTH_FAILED = 7,
}
SerializeEnum!(auth_stat);
DeserializeEnum!(auth_stat);

/// Authentication flavors known to this server. Only `AUTH_NONE` and
/// `AUTH_SYS` are ever accepted; the remaining flavors are recognized so
/// the dispatcher can reject them with a precise auth status.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum auth_flavor {
    /// No authentication.
    #[default]
    AUTH_NONE = 0,
    /// UNIX-style uid/gid credentials (AUTH_UNIX in older documents).
    AUTH_SYS = 1,
    /// Short-hand token issued by a previous reply.
    AUTH_SHORT = 2,
    /// Diffie-Hellman authentication.
    AUTH_DH = 3,
    /// RPCSEC_GSS framework.
    RPCSEC_GSS = 6,
}
SerializeEnum!(auth_flavor);
DeserializeEnum!(auth_flavor);

/// AUTH_SYS credential body as defined in RFC 5531 appendix A.
///
/// The machine name is kept as raw bytes here; the security manager
/// enforces UTF-8, the 255 byte limit and the 16 entry gid cap before a
/// request context is built from it.
#[derive(Clone, Debug, Default)]
pub struct auth_sys_parms {
    /// Arbitrary caller-chosen value, nominally a timestamp.
    pub stamp: u32,
    /// Name of the caller's machine.
    pub machinename: Vec<u8>,
    /// Effective user id of the caller.
    pub uid: u32,
    /// Effective group id of the caller.
    pub gid: u32,
    /// Auxiliary group ids.
    pub gids: Vec<u32>,
}
SerializeStruct!(auth_sys_parms, stamp, machinename, uid, gid, gids);
DeserializeStruct!(auth_sys_parms, stamp, machinename, uid, gid, gids);

/// Opaque authentication field carried in calls (credential + verifier)
/// and replies (verifier). The body is interpreted per flavor.
#[derive(Clone, Debug, Default)]
pub struct opaque_auth {
    /// Authentication mechanism selecting the body's interpretation.
    pub flavor: auth_flavor,
    /// Flavor-specific payload, at most 400 bytes on the wire.
    pub body: Vec<u8>,
}
SerializeStruct!(opaque_auth, flavor, body);
DeserializeStruct!(opaque_auth, flavor, body);

/// A complete RPC message: transaction id plus a call or reply body.
///
/// The xid is opaque to the server beyond being echoed verbatim into the
/// reply; clients use it to match replies to calls.
#[derive(Clone, Debug, Default)]
pub struct rpc_msg {
    pub xid: u32,
    pub body: rpc_body,
}
SerializeStruct!(rpc_msg, xid, body);
DeserializeStruct!(rpc_msg, xid, body);

/// Message body discriminated by msg_type (CALL = 0, REPLY = 1).
#[derive(Clone, Debug)]
pub enum rpc_body {
    CALL(call_body),
    REPLY(reply_body),
}

impl Default for rpc_body {
    fn default() -> rpc_body {
        rpc_body::CALL(call_body::default())
    }
}

impl Serialize for rpc_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            rpc_body::CALL(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            rpc_body::REPLY(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for rpc_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32>(src)? {
            0 => *self = rpc_body::CALL(deserialize(src)?),
            1 => *self = rpc_body::REPLY(deserialize(src)?),
            msg_type => return Err(invalid_data(format!("invalid msg_type {msg_type}"))),
        }
        Ok(())
    }
}

/// Call body: protocol version, target program/version/procedure and the
/// caller's credential and verifier. Procedure arguments follow on the
/// stream and are decoded by the selected handler.
#[derive(Clone, Debug, Default)]
pub struct call_body {
    pub rpcvers: u32,
    pub prog: u32,
    pub vers: u32,
    pub proc: u32,
    pub cred: opaque_auth,
    pub verf: opaque_auth,
}
SerializeStruct!(call_body, rpcvers, prog, vers, proc, cred, verf);
DeserializeStruct!(call_body, rpcvers, prog, vers, proc, cred, verf);

/// Reply body: the server either accepted the call (which may still carry
/// an accept-level error) or denied it outright.
#[derive(Clone, Debug)]
pub enum reply_body {
    MSG_ACCEPTED(accepted_reply),
    MSG_DENIED(rejected_reply),
}

impl Default for reply_body {
    fn default() -> reply_body {
        reply_body::MSG_ACCEPTED(accepted_reply::default())
    }
}

impl Serialize for reply_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            reply_body::MSG_ACCEPTED(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            reply_body::MSG_DENIED(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for reply_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32>(src)? {
            0 => *self = reply_body::MSG_ACCEPTED(deserialize(src)?),
            1 => *self = reply_body::MSG_DENIED(deserialize(src)?),
            stat => return Err(invalid_data(format!("invalid reply_stat {stat}"))),
        }
        Ok(())
    }
}

/// Version range advertised in RPC_MISMATCH and PROG_MISMATCH replies.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct mismatch_info {
    pub low: u32,
    pub high: u32,
}
SerializeStruct!(mismatch_info, low, high);
DeserializeStruct!(mismatch_info, low, high);

/// Reply to an accepted call: server verifier plus union over accept_stat.
#[derive(Clone, Debug, Default)]
pub struct accepted_reply {
    pub verf: opaque_auth,
    pub reply_data: accept_body,
}
SerializeStruct!(accepted_reply, verf, reply_data);
DeserializeStruct!(accepted_reply, verf, reply_data);

/// Outcome of an accepted call. On SUCCESS the procedure-specific results
/// follow this union on the stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum accept_body {
    /// The procedure executed; results follow.
    #[default]
    SUCCESS,
    /// The program is not exported by this server.
    PROG_UNAVAIL,
    /// The program exists but not at this version.
    PROG_MISMATCH(mismatch_info),
    /// The procedure number is not part of the program.
    PROC_UNAVAIL,
    /// The procedure arguments could not be decoded.
    GARBAGE_ARGS,
    /// Internal failure while processing the call.
    SYSTEM_ERR,
}

impl Serialize for accept_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            accept_body::SUCCESS => 0_u32.serialize(dest),
            accept_body::PROG_UNAVAIL => 1_u32.serialize(dest),
            accept_body::PROG_MISMATCH(v) => {
                2_u32.serialize(dest)?;
                v.serialize(dest)
            }
            accept_body::PROC_UNAVAIL => 3_u32.serialize(dest),
            accept_body::GARBAGE_ARGS => 4_u32.serialize(dest),
            accept_body::SYSTEM_ERR => 5_u32.serialize(dest),
        }
    }
}

impl Deserialize for accept_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32>(src)? {
            0 => *self = accept_body::SUCCESS,
            1 => *self = accept_body::PROG_UNAVAIL,
            2 => *self = accept_body::PROG_MISMATCH(deserialize(src)?),
            3 => *self = accept_body::PROC_UNAVAIL,
            4 => *self = accept_body::GARBAGE_ARGS,
            5 => *self = accept_body::SYSTEM_ERR,
            stat => return Err(invalid_data(format!("invalid accept_stat {stat}"))),
        }
        Ok(())
    }
}

/// Reply to a denied call: either the RPC version was wrong or the
/// credentials were refused.
#[derive(Clone, Debug)]
pub enum rejected_reply {
    RPC_MISMATCH(mismatch_info),
    AUTH_ERROR(auth_stat),
}

impl Default for rejected_reply {
    fn default() -> rejected_reply {
        rejected_reply::AUTH_ERROR(auth_stat::default())
    }
}

impl Serialize for rejected_reply {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            rejected_reply::RPC_MISMATCH(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            rejected_reply::AUTH_ERROR(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for rejected_reply {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32>(src)? {
            0 => *self = rejected_reply::RPC_MISMATCH(deserialize(src)?),
            1 => *self = rejected_reply::AUTH_ERROR(deserialize(src)?),
            stat => return Err(invalid_data(format!("invalid reject_stat {stat}"))),
        }
        Ok(())
    }
}

fn accepted(xid: u32, reply_data: accept_body) -> rpc_msg {
    rpc_msg {
        xid,
        body: rpc_body::REPLY(reply_body::MSG_ACCEPTED(accepted_reply {
            verf: opaque_auth::default(),
            reply_data,
        })),
    }
}

/// SUCCESS reply; the caller appends the procedure results.
pub fn make_success_reply(xid: u32) -> rpc_msg {
    accepted(xid, accept_body::SUCCESS)
}

/// The requested program is not served on this endpoint.
pub fn prog_unavail_reply_message(xid: u32) -> rpc_msg {
    accepted(xid, accept_body::PROG_UNAVAIL)
}

/// The program exists but only within `[low, high]` versions.
pub fn prog_mismatch_reply_message(xid: u32, low: u32, high: u32) -> rpc_msg {
    accepted(xid, accept_body::PROG_MISMATCH(mismatch_info { low, high }))
}

/// The procedure number is outside the program's table.
pub fn proc_unavail_reply_message(xid: u32) -> rpc_msg {
    accepted(xid, accept_body::PROC_UNAVAIL)
}

/// The procedure arguments failed to decode.
pub fn garbage_args_reply_message(xid: u32) -> rpc_msg {
    accepted(xid, accept_body::GARBAGE_ARGS)
}

/// Internal error while executing an otherwise well-formed call.
pub fn system_err_reply_message(xid: u32) -> rpc_msg {
    accepted(xid, accept_body::SYSTEM_ERR)
}

/// The caller spoke an RPC version other than 2.
pub fn rpc_mismatch_reply_message(xid: u32) -> rpc_msg {
    rpc_msg {
        xid,
        body: rpc_body::REPLY(reply_body::MSG_DENIED(rejected_reply::RPC_MISMATCH(
            mismatch_info { low: RPC_VERSION, high: RPC_VERSION },
        ))),
    }
}

/// The caller's credentials were refused.
pub fn auth_error_reply_message(xid: u32, stat: auth_stat) -> rpc_msg {
    rpc_msg {
        xid,
        body: rpc_body::REPLY(reply_body::MSG_DENIED(rejected_reply::AUTH_ERROR(stat))),
    }
}
