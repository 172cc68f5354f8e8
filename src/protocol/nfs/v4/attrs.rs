//! fattr4 attribute packing: translating between the bitmap-plus-blob
//! wire form and [`FileStat`] / [`SetAttrs`].

use std::io::{Cursor, Read};

use crate::protocol::xdr::nfs4::{self, bitmap_get, bitmap_set, bitmap4, fattr4, nfsstat4};
use crate::protocol::xdr::{deserialize, Serialize};
use crate::vfs::{FileKind, FileStat, SetAttrs, SetTime, Timestamp};

/// Settable time attributes (distinct numbers from the readable ones).
pub const FATTR4_TIME_ACCESS_SET: u32 = 48;
pub const FATTR4_TIME_MODIFY_SET: u32 = 54;

const SET_TO_SERVER_TIME4: u32 = 0;
const SET_TO_CLIENT_TIME4: u32 = 1;

/// Attributes this server can return.
pub fn supported_attrs() -> bitmap4 {
    let mut mask = bitmap4::new();
    for attr in [
        nfs4::FATTR4_SUPPORTED_ATTRS,
        nfs4::FATTR4_TYPE,
        nfs4::FATTR4_FH_EXPIRE_TYPE,
        nfs4::FATTR4_CHANGE,
        nfs4::FATTR4_SIZE,
        nfs4::FATTR4_LINK_SUPPORT,
        nfs4::FATTR4_SYMLINK_SUPPORT,
        nfs4::FATTR4_NAMED_ATTR,
        nfs4::FATTR4_FSID,
        nfs4::FATTR4_UNIQUE_HANDLES,
        nfs4::FATTR4_LEASE_TIME,
        nfs4::FATTR4_FILEHANDLE,
        nfs4::FATTR4_FILEID,
        nfs4::FATTR4_MODE,
        nfs4::FATTR4_NUMLINKS,
        nfs4::FATTR4_OWNER,
        nfs4::FATTR4_OWNER_GROUP,
        nfs4::FATTR4_SPACE_USED,
        nfs4::FATTR4_TIME_ACCESS,
        nfs4::FATTR4_TIME_METADATA,
        nfs4::FATTR4_TIME_MODIFY,
    ] {
        bitmap_set(&mut mask, attr);
    }
    mask
}

fn file_type_of(kind: FileKind) -> u32 {
    match kind {
        FileKind::Regular => nfs4::NF4REG,
        FileKind::Directory => nfs4::NF4DIR,
        FileKind::Block => nfs4::NF4BLK,
        FileKind::Char => nfs4::NF4CHR,
        FileKind::Symlink => nfs4::NF4LNK,
        FileKind::Socket => nfs4::NF4SOCK,
        FileKind::Fifo => nfs4::NF4FIFO,
    }
}

fn encode_time(ts: Timestamp, out: &mut Vec<u8>) -> std::io::Result<()> {
    ts.seconds.serialize(out)?;
    ts.nanos.serialize(out)
}

/// The change attribute: mutation counter derived from ctime.
fn change_of(stat: &FileStat) -> u64 {
    (stat.ctime.seconds as u64) << 32 | stat.ctime.nanos as u64
}

/// Packs the requested attributes of `stat` into wire form. Unknown or
/// unsupported requested bits are silently omitted from the reply mask,
/// as the protocol requires.
pub fn encode_fattr4(
    requested: &bitmap4,
    stat: &FileStat,
    fh: &[u8],
    lease_secs: u32,
) -> std::io::Result<fattr4> {
    let supported = supported_attrs();
    let mut mask = bitmap4::new();
    let mut vals: Vec<u8> = Vec::new();

    // Attribute values are packed in ascending attribute order.
    for attr in 0..=nfs4::FATTR4_TIME_MODIFY {
        if !bitmap_get(requested, attr) || !bitmap_get(&supported, attr) {
            continue;
        }
        bitmap_set(&mut mask, attr);
        match attr {
            nfs4::FATTR4_SUPPORTED_ATTRS => supported.serialize(&mut vals)?,
            nfs4::FATTR4_TYPE => file_type_of(stat.kind).serialize(&mut vals)?,
            // FH4_VOLATILE_ANY: handles may go stale on rename/unlink.
            nfs4::FATTR4_FH_EXPIRE_TYPE => 2_u32.serialize(&mut vals)?,
            nfs4::FATTR4_CHANGE => change_of(stat).serialize(&mut vals)?,
            nfs4::FATTR4_SIZE => stat.size.serialize(&mut vals)?,
            nfs4::FATTR4_LINK_SUPPORT => true.serialize(&mut vals)?,
            nfs4::FATTR4_SYMLINK_SUPPORT => true.serialize(&mut vals)?,
            nfs4::FATTR4_NAMED_ATTR => false.serialize(&mut vals)?,
            nfs4::FATTR4_FSID => {
                stat.fsid.serialize(&mut vals)?;
                0_u64.serialize(&mut vals)?;
            }
            nfs4::FATTR4_UNIQUE_HANDLES => false.serialize(&mut vals)?,
            nfs4::FATTR4_LEASE_TIME => lease_secs.serialize(&mut vals)?,
            nfs4::FATTR4_FILEHANDLE => fh.to_vec().serialize(&mut vals)?,
            nfs4::FATTR4_FILEID => stat.fileid.serialize(&mut vals)?,
            nfs4::FATTR4_MODE => stat.mode.serialize(&mut vals)?,
            nfs4::FATTR4_NUMLINKS => stat.nlink.serialize(&mut vals)?,
            nfs4::FATTR4_OWNER => stat.uid.to_string().serialize(&mut vals)?,
            nfs4::FATTR4_OWNER_GROUP => stat.gid.to_string().serialize(&mut vals)?,
            nfs4::FATTR4_SPACE_USED => stat.used.serialize(&mut vals)?,
            nfs4::FATTR4_TIME_ACCESS => encode_time(stat.atime, &mut vals)?,
            nfs4::FATTR4_TIME_METADATA => encode_time(stat.ctime, &mut vals)?,
            nfs4::FATTR4_TIME_MODIFY => encode_time(stat.mtime, &mut vals)?,
            _ => unreachable!("attribute {attr} is in the supported mask"),
        }
    }

    Ok(fattr4 { attrmask: mask, attr_vals: vals })
}

fn decode_time_set(src: &mut impl Read) -> Result<SetTime, nfsstat4> {
    let how = deserialize::<u32>(src).map_err(|_| nfsstat4::NFS4ERR_INVAL)?;
    match how {
        SET_TO_SERVER_TIME4 => Ok(SetTime::ServerTime),
        SET_TO_CLIENT_TIME4 => {
            let seconds = deserialize::<i64>(src).map_err(|_| nfsstat4::NFS4ERR_INVAL)?;
            let nanos = deserialize::<u32>(src).map_err(|_| nfsstat4::NFS4ERR_INVAL)?;
            Ok(SetTime::ClientTime(Timestamp { seconds, nanos }))
        }
        _ => Err(nfsstat4::NFS4ERR_INVAL),
    }
}

/// Unpacks the settable attributes SETATTR and CREATE accept. A request
/// naming an attribute this server cannot set fails ATTRNOTSUPP.
pub fn decode_settable(attrs: &fattr4) -> Result<SetAttrs, nfsstat4> {
    let mut out = SetAttrs::default();
    let mut cursor = Cursor::new(&attrs.attr_vals);

    for word in 0..attrs.attrmask.len() as u32 {
        for bit in 0..32 {
            let attr = word * 32 + bit;
            if !bitmap_get(&attrs.attrmask, attr) {
                continue;
            }
            match attr {
                nfs4::FATTR4_SIZE => {
                    out.size =
                        Some(deserialize::<u64>(&mut cursor).map_err(|_| nfsstat4::NFS4ERR_INVAL)?);
                }
                nfs4::FATTR4_MODE => {
                    out.mode =
                        Some(deserialize::<u32>(&mut cursor).map_err(|_| nfsstat4::NFS4ERR_INVAL)?);
                }
                nfs4::FATTR4_OWNER => {
                    let owner = deserialize::<String>(&mut cursor)
                        .map_err(|_| nfsstat4::NFS4ERR_INVAL)?;
                    out.uid = Some(parse_principal(&owner)?);
                }
                nfs4::FATTR4_OWNER_GROUP => {
                    let group = deserialize::<String>(&mut cursor)
                        .map_err(|_| nfsstat4::NFS4ERR_INVAL)?;
                    out.gid = Some(parse_principal(&group)?);
                }
                FATTR4_TIME_ACCESS_SET => out.atime = Some(decode_time_set(&mut cursor)?),
                FATTR4_TIME_MODIFY_SET => out.mtime = Some(decode_time_set(&mut cursor)?),
                _ => return Err(nfsstat4::NFS4ERR_ATTRNOTSUPP),
            }
        }
    }
    Ok(out)
}

/// Principals are numeric ids, optionally with an `@domain` suffix.
fn parse_principal(name: &str) -> Result<u32, nfsstat4> {
    let id = name.split('@').next().unwrap_or(name);
    id.parse::<u32>().map_err(|_| nfsstat4::NFS4ERR_BADNAME)
}
