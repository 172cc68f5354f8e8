//! MOUNTPROC_UMNT (procedure 3): forget one mount of the caller.

use std::io::{Read, Write};

use tracing::{debug, info};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, Serialize};

pub fn mountproc_umnt(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let dirpath = match deserialize::<String>(input) {
        Ok(path) => path,
        Err(_) => {
            xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
            return Ok(());
        }
    };
    debug!("mountproc_umnt({xid}, {dirpath:?})");

    let client = context.client_ip().to_string();
    context.mounts.remove(&client, &dirpath);
    context
        .security
        .audit(&context.sec, "UMNT", std::path::Path::new(&dirpath), true, "");
    info!(client, dirpath, "unmounted");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    Ok(())
}
