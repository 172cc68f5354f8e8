//! MOUNTPROC_DUMP (procedure 2): list active mounts.

use std::io::Write;

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, Serialize};

pub fn mountproc_dump(
    xid: u32,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let records = context.mounts.list();
    debug!("mountproc_dump({xid}) -> {} entries", records.len());

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    for record in &records {
        true.serialize(output)?;
        record.client.serialize(output)?;
        record.dirpath.serialize(output)?;
    }
    false.serialize(output)?;
    Ok(())
}
