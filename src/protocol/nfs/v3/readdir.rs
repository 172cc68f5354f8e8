//! NFSPROC3_READDIR (procedure 16, RFC 1813 section 3.3.16).
//!
//! The cookie is the index of the next entry in the backend's stable
//! ordering; the cookie verifier is the server's boot verifier so
//! cookies from a previous incarnation are detected.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{resolve_handle, vfs_stat3};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::PERM_READ;

/// Encoded overhead of one entry beyond its name bytes.
const ENTRY_OVERHEAD: u32 = 24;

pub async fn nfsproc3_readdir(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::dir::READDIR3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!("nfsproc3_readdir({xid}, cookie={}, count={})", args.cookie, args.count);

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (path, stat) = match resolve_handle(context, &args.dir.data, PERM_READ, "READDIR").await {
        Ok(resolved) => resolved,
        Err(e) => {
            e.as_stat3().serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };
    let dir_attr: nfs3::post_op_attr = Some(crate::protocol::nfs::fattr3_from(&stat));
    if !stat.is_dir() {
        nfs3::nfsstat3::NFS3ERR_NOTDIR.serialize(output)?;
        dir_attr.serialize(output)?;
        return Ok(());
    }

    let verifier = context.handles.boot_verifier();
    if args.cookie != 0 && args.cookieverf != [0; 8] && args.cookieverf != verifier {
        nfs3::nfsstat3::NFS3ERR_BAD_COOKIE.serialize(output)?;
        dir_attr.serialize(output)?;
        return Ok(());
    }

    let entries = match context.vfs.readdir(&path).await {
        Ok(entries) => entries,
        Err(e) => {
            vfs_stat3(e).serialize(output)?;
            dir_attr.serialize(output)?;
            return Ok(());
        }
    };
    let start = args.cookie as usize;
    if start > entries.len() {
        nfs3::nfsstat3::NFS3ERR_BAD_COOKIE.serialize(output)?;
        dir_attr.serialize(output)?;
        return Ok(());
    }

    nfs3::nfsstat3::NFS3_OK.serialize(output)?;
    dir_attr.serialize(output)?;
    verifier.serialize(output)?;

    let mut budget = args.count.saturating_sub(64);
    let mut index = start;
    for entry in entries.iter().skip(start) {
        let cost = ENTRY_OVERHEAD + entry.name.len() as u32;
        if cost > budget {
            break;
        }
        budget -= cost;
        index += 1;
        true.serialize(output)?;
        nfs3::dir::entry3 {
            fileid: entry.stat.fileid,
            name: entry.name.as_slice().into(),
            cookie: index as u64,
        }
        .serialize(output)?;
    }
    false.serialize(output)?;
    (index >= entries.len()).serialize(output)?;
    Ok(())
}
