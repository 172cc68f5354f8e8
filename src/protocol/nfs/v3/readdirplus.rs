//! NFSPROC3_READDIRPLUS (procedure 17, RFC 1813 section 3.3.17):
//! READDIR plus per-entry attributes and handles. `dircount` budgets
//! the directory information alone, `maxcount` the whole reply.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::nfs::{fattr3_from, handle_id_for, resolve_handle, vfs_stat3};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::security::PERM_READ;

/// Encoded overhead of one plus-entry beyond its name bytes: chain
/// flag, fileid, cookie, both attribute unions and the handle.
const PLUS_ENTRY_OVERHEAD: u32 = 200;

pub async fn nfsproc3_readdirplus(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let Ok(args) = deserialize::<nfs3::dir::READDIRPLUS3args>(input) else {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    };
    debug!(
        "nfsproc3_readdirplus({xid}, cookie={}, dircount={}, maxcount={})",
        args.cookie, args.dircount, args.maxcount
    );

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    let (path, stat) =
        match resolve_handle(context, &args.dir.data, PERM_READ, "READDIRPLUS").await {
            Ok(resolved) => resolved,
            Err(e) => {
                e.as_stat3().serialize(output)?;
                nfs3::post_op_attr::None.serialize(output)?;
                return Ok(());
            }
        };
    let dir_attr: nfs3::post_op_attr = Some(fattr3_from(&stat));
    if !stat.is_dir() {
        nfs3::nfsstat3::NFS3ERR_NOTDIR.serialize(output)?;
        dir_attr.serialize(output)?;
        return Ok(());
    }
    if args.maxcount < 512 {
        nfs3::nfsstat3::NFS3ERR_TOOSMALL.serialize(output)?;
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

    let mut budget = args.maxcount.saturating_sub(128);
    let mut index = start;
    for entry in entries.iter().skip(start) {
        let cost = PLUS_ENTRY_OVERHEAD + entry.name.len() as u32;
        if cost > budget {
            break;
        }
        budget -= cost;
        index += 1;
        let child = path.join(String::from_utf8_lossy(&entry.name).as_ref());
        let id = handle_id_for(context, &child, &entry.stat);
        true.serialize(output)?;
        nfs3::dir::entryplus3 {
            fileid: entry.stat.fileid,
            name: entry.name.as_slice().into(),
            cookie: index as u64,
            name_attributes: Some(fattr3_from(&entry.stat)),
            name_handle: Some(nfs3::nfs_fh3 { data: context.handles.encode(id) }),
        }
        .serialize(output)?;
    }
    false.serialize(output)?;
    (index >= entries.len()).serialize(output)?;
    Ok(())
}
