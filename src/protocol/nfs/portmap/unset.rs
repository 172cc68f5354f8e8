//! PMAPPROC_UNSET (procedure 2): remove the mappings of a program and
//! version across every protocol.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, portmap, Serialize};

pub fn pmapproc_unset(
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
    debug!("pmapproc_unset({xid}, {mapping:?})");

    let removed = context.portmap.unset(mapping.prog, mapping.vers);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    removed.serialize(output)?;
    Ok(())
}
