//! MOUNTPROC_EXPORT (procedure 5): list the export table with its
//! client groups.

use std::io::Write;

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, Serialize};

pub fn mountproc_export(
    xid: u32,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    debug!("mountproc_export({xid})");
    xdr::rpc::make_success_reply(xid).serialize(output)?;

    if context.config.exports.is_empty() {
        // The implicit root export, open to every client group.
        true.serialize(output)?;
        "/".to_string().serialize(output)?;
        false.serialize(output)?;
    } else {
        for export in &context.config.exports {
            true.serialize(output)?;
            format!("/{}", export.name).serialize(output)?;
            for group in &export.clients {
                true.serialize(output)?;
                group.clone().serialize(output)?;
            }
            false.serialize(output)?;
        }
    }
    false.serialize(output)?;
    Ok(())
}
