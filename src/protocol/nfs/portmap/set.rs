//! PMAPPROC_SET (procedure 1): register a program-to-port mapping.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, portmap, Serialize};

pub fn pmapproc_set(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let mapping = match deserialize::<portmap::mapping>(input) {
        Ok(mapping) => mapping,
        Err(_) => {
            xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
            return Ok(());
        }
    };
    debug!("pmapproc_set({xid}, {mapping:?})");

    let port = u16::try_from(mapping.port).unwrap_or(0);
    let owner = context.client_addr.to_string();
    let accepted = context.portmap.set(mapping.prog, mapping.vers, mapping.prot, port, &owner);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    accepted.serialize(output)?;
    Ok(())
}
