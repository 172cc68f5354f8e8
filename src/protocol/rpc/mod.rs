//! ONC-RPC version 2 dispatcher (RFC 5531).
//!
//! `handle_rpc` drives one call through the steps the protocol
//! requires: envelope validation, program and version resolution,
//! authentication, then hand-off to the program handler which decodes
//! its own arguments. The three error planes stay separate: transport
//! errors surface as `Err` (the connection is closed, or the datagram
//! dropped), RPC-level errors become MSG_DENIED / MSG_ACCEPTED replies
//! built here, and NFS-level errors are ordinary SUCCESS replies whose
//! body carries the status code.

mod context;
mod wire;

use std::io::{Read, Write};

use anyhow::anyhow;
use tracing::{debug, warn};

pub use context::{Context, LoadGuard, ServerLoad, Transport};
pub use wire::{write_fragment, SocketMessageHandler, SocketMessageType};

use crate::protocol::nfs;
use crate::protocol::xdr::rpc::{auth_stat, RPC_VERSION};
use crate::protocol::xdr::{self, deserialize, nfs2, nfs3, nfs4, portmap, Serialize};

/// Lowest/highest NFS version this build serves, from the configuration.
fn nfs_version_range(context: &Context) -> (u32, u32) {
    let mut enabled = Vec::new();
    if context.config.enable_nfsv2 {
        enabled.push(nfs2::VERSION);
    }
    if context.config.enable_nfsv3 {
        enabled.push(nfs3::VERSION);
    }
    if context.config.enable_nfsv4 {
        enabled.push(nfs4::VERSION);
    }
    match (enabled.first(), enabled.last()) {
        (Some(lo), Some(hi)) => (*lo, *hi),
        _ => (nfs3::VERSION, nfs3::VERSION),
    }
}

/// Whether the authenticated flavor may invoke this call at all.
///
/// AUTH_NONE is enough for NULL procedures and the discovery programs
/// (portmap, mount export listing); data-plane calls need AUTH_SYS
/// unless anonymous access is configured. NFSv4 COMPOUNDs pass through:
/// the per-operation access checks deny unauthenticated file access.
fn flavor_sufficient(context: &Context, prog: u32, vers: u32, proc: u32) -> bool {
    if context.sec.authenticated {
        return true;
    }
    if proc == 0 || prog == portmap::PROGRAM || prog == nfs::mount::PROGRAM {
        return true;
    }
    if prog == nfs3::PROGRAM && vers == nfs4::VERSION {
        return true;
    }
    context.config.anonymous_access
}

/// Processes a single RPC call.
///
/// Returns `Ok(true)` when a reply was written, `Ok(false)` when the
/// call was consumed without one, and `Err` for transport-plane
/// failures (malformed envelope): the TCP path closes the connection,
/// the UDP path drops the datagram silently.
pub async fn handle_rpc(
    input: &mut (impl Read + Send),
    output: &mut (impl Write + Send),
    context: &mut Context,
) -> Result<bool, anyhow::Error> {
    let recv = deserialize::<xdr::rpc::rpc_msg>(input)?;
    let xid = recv.xid;
    let xdr::rpc::rpc_body::CALL(call) = recv.body else {
        return Err(anyhow!("received a Reply where a Call was expected"));
    };

    if call.rpcvers != RPC_VERSION {
        warn!("invalid RPC version {} != {}", call.rpcvers, RPC_VERSION);
        xdr::rpc::rpc_mismatch_reply_message(xid).serialize(output)?;
        return Ok(true);
    }

    // Resolve (program, version) before touching credentials so version
    // probes get their mismatch replies no matter what they carry.
    match call.prog {
        portmap::PROGRAM => {
            if call.vers != portmap::VERSION {
                warn!("unsupported portmap version {}", call.vers);
                xdr::rpc::prog_mismatch_reply_message(xid, portmap::VERSION, portmap::VERSION)
                    .serialize(output)?;
                return Ok(true);
            }
        }
        nfs3::PROGRAM => {
            let (low, high) = nfs_version_range(context);
            let enabled = match call.vers {
                2 => context.config.enable_nfsv2,
                3 => context.config.enable_nfsv3,
                4 => context.config.enable_nfsv4,
                _ => false,
            };
            if !enabled {
                warn!("unsupported NFS version {} (serving {}..={})", call.vers, low, high);
                xdr::rpc::prog_mismatch_reply_message(xid, low, high).serialize(output)?;
                return Ok(true);
            }
        }
        nfs::mount::PROGRAM => {
            if !(nfs::mount::VERSION_RANGE).contains(&call.vers) {
                xdr::rpc::prog_mismatch_reply_message(
                    xid,
                    *nfs::mount::VERSION_RANGE.start(),
                    *nfs::mount::VERSION_RANGE.end(),
                )
                .serialize(output)?;
                return Ok(true);
            }
        }
        unknown => {
            warn!("unknown RPC program {unknown}");
            xdr::rpc::prog_unavail_reply_message(xid).serialize(output)?;
            return Ok(true);
        }
    }

    match context.security.authenticate(&call.cred, context.client_ip()) {
        Ok(sec) => context.sec = sec,
        Err(stat) => {
            debug!(?stat, "authentication refused");
            xdr::rpc::auth_error_reply_message(xid, stat).serialize(output)?;
            return Ok(true);
        }
    }
    if !flavor_sufficient(context, call.prog, call.vers, call.proc) {
        xdr::rpc::auth_error_reply_message(xid, auth_stat::AUTH_TOOWEAK).serialize(output)?;
        return Ok(true);
    }

    match call.prog {
        portmap::PROGRAM => nfs::portmap::handle_portmap(xid, &call, input, output, context)?,
        nfs3::PROGRAM => match call.vers {
            nfs2::VERSION => nfs::v2::handle_nfs2(xid, &call, input, output, context).await?,
            nfs3::VERSION => nfs::v3::handle_nfs3(xid, &call, input, output, context).await?,
            nfs4::VERSION => nfs::v4::handle_nfs4(xid, &call, input, output, context).await?,
            _ => unreachable!("version gated above"),
        },
        nfs::mount::PROGRAM => {
            nfs::mount::handle_mount(xid, &call, input, output, context).await?
        }
        _ => unreachable!("program gated above"),
    }
    Ok(true)
}
