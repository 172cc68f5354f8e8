//! PMAPPROC_GETPORT (procedure 3): look up the port of a registered
//! program. Unregistered triples answer with port zero.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, portmap, Serialize};

pub fn pmapproc_getport(
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
    let port = context.portmap.get_port(mapping.prog, mapping.vers, mapping.prot) as u32;
    debug!("pmapproc_getport({xid}, {mapping:?}) -> {port}");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    port.serialize(output)?;
    Ok(())
}
