//! NFSPROC_READDIR (procedure 16). The opaque 4-byte cookie is the
//! index of the next entry in the backend's stable ordering.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{resolve_handle, vfs_stat2};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs2, Serialize};
use crate::security::PERM_READ;

/// Fixed per-entry overhead used for the reply size budget: chain flag,
/// fileid, name length, cookie.
const ENTRY_OVERHEAD: u32 = 16;

pub async fn nfsproc2_readdir(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs2::readdirargs2>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    let start = u32::from_le_bytes(args.cookie) as usize;
    debug!("nfsproc2_readdir({xid}, start={start}, count={})", args.count);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (path, stat) = match resolve_handle(context, &args.dir.data, PERM_READ, "READDIR").await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat2().serialize(output)?;
            return Ok(());
        }
    };
    if !stat.is_dir() {
        nfs2::nfsstat2::NFSERR_NOTDIR.serialize(output)?;
        return Ok(());
    }

    let entries = match context.vfs.readdir(&path).await {
        Ok(entries) => entries,
        Err(e) => {
            vfs_stat2(e).serialize(output)?;
            return Ok(());
        }
    };

    nfs2::nfsstat2::NFS_OK.serialize(output)?;
    let mut budget = args.count.saturating_sub(16);
    let mut index = start;
    for entry in entries.iter().skip(start) {
        let cost = ENTRY_OVERHEAD + entry.name.len() as u32;
        if cost > budget {
            break;
        }
        budget -= cost;
        index += 1;
        true.serialize(output)?;
        nfs2::entry2 {
            fileid: entry.stat.fileid as u32,
            name: entry.name.clone(),
            cookie: (index as u32).to_le_bytes(),
        }
        .serialize(output)?;
    }
    false.serialize(output)?;
    // EOF when the listing is exhausted.
    (index >= entries.len()).serialize(output)?;
    Ok(())
}
