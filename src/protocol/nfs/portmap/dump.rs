//! PMAPPROC_DUMP (procedure 4): list every registered mapping.

use std::io::Write;

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, portmap, Serialize};

pub fn pmapproc_dump(
    xid: u32,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let entries = context.portmap.dump();
    debug!("pmapproc_dump({xid}) -> {} entries", entries.len());

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    portmap::pmaplist { entries }.serialize(output)?;
    Ok(())
}
