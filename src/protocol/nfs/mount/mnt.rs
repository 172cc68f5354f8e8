//! MOUNTPROC_MNT (procedure 1): resolve an export name to its root
//! file handle.
//!
//! The requested directory path is matched against the configured
//! exports (falling back to the export root itself when none are
//! configured). The client list of the export gates access. Version 1
//! replies carry the fixed 32-byte v2 handle; version 3 replies carry
//! the variable handle plus the list of acceptable auth flavors.

use std::io::{Read, Write};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::protocol::nfs::handle_id_for;
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, Serialize};

use super::{MNT3ERR_ACCES, MNT3ERR_NOENT, MNT_OK};

/// Auth flavors advertised in v3 MNT replies.
const AUTH_FLAVOR_SYS: u32 = 1;

fn resolve_export(context: &rpc::Context, dirpath: &str) -> Result<PathBuf, u32> {
    let trimmed = dirpath.trim_end_matches('/');
    let config = &context.config;

    if config.exports.is_empty() {
        // Single implicit export of the whole root.
        if trimmed.is_empty() || trimmed == "/" {
            return Ok(config.root_path.clone());
        }
        return Err(MNT3ERR_NOENT);
    }

    let name = trimmed.trim_start_matches('/');
    let export = config
        .exports
        .iter()
        .find(|e| e.name == name || e.path.as_os_str() == trimmed)
        .ok_or(MNT3ERR_NOENT)?;
    if !export.matches_client(context.client_ip()) {
        return Err(MNT3ERR_ACCES);
    }
    Ok(export.path.clone())
}

pub async fn mountproc_mnt(
    xid: u32,
    vers: u32,
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
    debug!("mountproc_mnt({xid}, {dirpath:?}, v{vers})");

    let path = match resolve_export(context, &dirpath) {
        Ok(path) => path,
        Err(status) => {
            context
                .security
                .audit(&context.sec, "MNT", std::path::Path::new(&dirpath), false, "export refused");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            status.serialize(output)?;
            return Ok(());
        }
    };

    let stat = match context.vfs.stat(&path).await {
        Ok(stat) if stat.is_dir() => stat,
        Ok(_) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            super::MNT3ERR_NOTDIR.serialize(output)?;
            return Ok(());
        }
        Err(_) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            MNT3ERR_NOENT.serialize(output)?;
            return Ok(());
        }
    };

    let id = handle_id_for(context, &path, &stat);
    let client = context.client_ip().to_string();
    context.mounts.add(&client, &dirpath);
    context.security.audit(&context.sec, "MNT", &path, true, "");
    info!(client, dirpath, "mounted");

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    MNT_OK.serialize(output)?;
    if vers < 3 {
        context.handles.encode_v2(id).serialize(output)?;
    } else {
        context.handles.encode(id).serialize(output)?;
        vec![AUTH_FLAVOR_SYS].serialize(output)?;
    }
    Ok(())
}
