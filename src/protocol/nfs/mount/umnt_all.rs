//! MOUNTPROC_UMNTALL (procedure 4): forget every mount of the caller.

use std::io::Write;

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, Serialize};

pub fn mountproc_umnt_all(
    xid: u32,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let client = context.client_ip().to_string();
    debug!("mountproc_umnt_all({xid}, {client})");
    context.mounts.remove_all(&client);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    Ok(())
}
