//! MOUNT program (RFC 1813 appendix I): how v2/v3 clients obtain the
//! root file handle of an export. Version 1 serves NFSv2 clients with
//! fixed 32-byte handles, version 3 serves NFSv3. NFSv4 clients use
//! PUTROOTFH instead and never call this program.
//!
//! The mount table records which client mounted which export so DUMP
//! can answer and UMNT/UMNTALL can clean up; it is advisory state, not
//! an access control mechanism.

use std::io::{Read, Write};
use std::ops::RangeInclusive;
use std::sync::Mutex;
use std::time::SystemTime;

use num_traits::cast::FromPrimitive;
use tracing::warn;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, Serialize};

mod dump;
mod export;
mod mnt;
mod null;
mod umnt;
mod umnt_all;

use dump::mountproc_dump;
use export::mountproc_export;
use mnt::mountproc_mnt;
use null::mountproc_null;
use umnt::mountproc_umnt;
use umnt_all::mountproc_umnt_all;

/// MOUNT RPC program number.
pub const PROGRAM: u32 = 100005;
/// Served protocol versions (v1 for NFSv2 clients, v3 for NFSv3).
pub const VERSION_RANGE: RangeInclusive<u32> = 1..=3;

/// Mount-level status codes shared by v1 and v3.
pub const MNT_OK: u32 = 0;
pub const MNT3ERR_NOENT: u32 = 2;
pub const MNT3ERR_ACCES: u32 = 13;
pub const MNT3ERR_NOTDIR: u32 = 20;
pub const MNT3ERR_SERVERFAULT: u32 = 10006;

/// Procedure numbers of the MOUNT program.
#[derive(Copy, Clone, Debug, PartialEq, Eq, num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub enum MountProc {
    MOUNTPROC_NULL = 0,
    MOUNTPROC_MNT = 1,
    MOUNTPROC_DUMP = 2,
    MOUNTPROC_UMNT = 3,
    MOUNTPROC_UMNTALL = 4,
    MOUNTPROC_EXPORT = 5,
    INVALID = 6,
}

/// One active mount.
#[derive(Clone, Debug)]
pub struct MountRecord {
    pub client: String,
    pub dirpath: String,
    pub mounted_at: SystemTime,
}

/// Advisory table of active mounts.
#[derive(Default)]
pub struct MountTable {
    records: Mutex<Vec<MountRecord>>,
}

impl MountTable {
    pub fn add(&self, client: &str, dirpath: &str) {
        let mut records = self.records.lock().expect("mount table poisoned");
        if !records.iter().any(|r| r.client == client && r.dirpath == dirpath) {
            records.push(MountRecord {
                client: client.to_string(),
                dirpath: dirpath.to_string(),
                mounted_at: SystemTime::now(),
            });
        }
    }

    pub fn remove(&self, client: &str, dirpath: &str) {
        let mut records = self.records.lock().expect("mount table poisoned");
        records.retain(|r| !(r.client == client && r.dirpath == dirpath));
    }

    pub fn remove_all(&self, client: &str) {
        let mut records = self.records.lock().expect("mount table poisoned");
        records.retain(|r| r.client != client);
    }

    pub fn list(&self) -> Vec<MountRecord> {
        self.records.lock().expect("mount table poisoned").clone()
    }
}

/// Dispatches one MOUNT call. The version was validated upstream.
pub async fn handle_mount(
    xid: u32,
    call: &xdr::rpc::call_body,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let proc = MountProc::from_u32(call.proc).unwrap_or(MountProc::INVALID);
    match proc {
        MountProc::MOUNTPROC_NULL => mountproc_null(xid, output)?,
        MountProc::MOUNTPROC_MNT => mountproc_mnt(xid, call.vers, input, output, context).await?,
        MountProc::MOUNTPROC_DUMP => mountproc_dump(xid, output, context)?,
        MountProc::MOUNTPROC_UMNT => mountproc_umnt(xid, input, output, context)?,
        MountProc::MOUNTPROC_UMNTALL => mountproc_umnt_all(xid, output, context)?,
        MountProc::MOUNTPROC_EXPORT => mountproc_export(xid, output, context)?,
        MountProc::INVALID => {
            warn!("unknown mount procedure {}", call.proc);
            xdr::rpc::proc_unavail_reply_message(xid).serialize(output)?;
        }
    }
    Ok(())
}
