//! Argument and result structures for the version 3 file data procedures:
//! READ, WRITE, COMMIT, SETATTR, LINK, SYMLINK and the CREATE family.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::*;

/// ACCESS bit: read file data or read a directory.
pub const ACCESS3_READ: u32 = 0x0001;
/// ACCESS bit: look up a name in a directory.
pub const ACCESS3_LOOKUP: u32 = 0x0002;
/// ACCESS bit: rewrite existing file content.
pub const ACCESS3_MODIFY: u32 = 0x0004;
/// ACCESS bit: extend a file or add directory entries.
pub const ACCESS3_EXTEND: u32 = 0x0008;
/// ACCESS bit: delete an entry from a directory.
pub const ACCESS3_DELETE: u32 = 0x0010;
/// ACCESS bit: execute a file or traverse a directory.
pub const ACCESS3_EXECUTE: u32 = 0x0020;

#[derive(Clone, Debug, Default)]
pub struct GETATTR3args {
    pub object: nfs_fh3,
}
SerializeStruct!(GETATTR3args, object);
DeserializeStruct!(GETATTR3args, object);

/// Guard letting SETATTR fail unless the object's ctime still matches.
pub type sattrguard3 = Option<nfstime3>;

#[derive(Clone, Debug, Default)]
pub struct SETATTR3args {
    pub object: nfs_fh3,
    pub new_attributes: sattr3,
    pub guard: sattrguard3,
}
SerializeStruct!(SETATTR3args, object, new_attributes, guard);
DeserializeStruct!(SETATTR3args, object, new_attributes, guard);

#[derive(Clone, Debug, Default)]
pub struct ACCESS3args {
    pub object: nfs_fh3,
    pub access: u32,
}
SerializeStruct!(ACCESS3args, object, access);
DeserializeStruct!(ACCESS3args, object, access);

#[derive(Clone, Debug, Default)]
pub struct READ3args {
    pub file: nfs_fh3,
    pub offset: offset3,
    pub count: count3,
}
SerializeStruct!(READ3args, file, offset, count);
DeserializeStruct!(READ3args, file, offset, count);

#[derive(Clone, Debug, Default)]
pub struct READ3resok {
    pub file_attributes: post_op_attr,
    pub count: count3,
    pub eof: bool,
    pub data: Vec<u8>,
}
SerializeStruct!(READ3resok, file_attributes, count, eof, data);
DeserializeStruct!(READ3resok, file_attributes, count, eof, data);

/// Stability the client requests for a WRITE and the server reports back.
/// UNSTABLE data is only durable after a subsequent COMMIT.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum stable_how {
    #[default]
    UNSTABLE = 0,
    DATA_SYNC = 1,
    FILE_SYNC = 2,
}
SerializeEnum!(stable_how);
DeserializeEnum!(stable_how);

#[derive(Clone, Debug, Default)]
pub struct WRITE3args {
    pub file: nfs_fh3,
    pub offset: offset3,
    pub count: count3,
    pub stable: stable_how,
    pub data: Vec<u8>,
}
SerializeStruct!(WRITE3args, file, offset, count, stable, data);
DeserializeStruct!(WRITE3args, file, offset, count, stable, data);

#[derive(Clone, Debug, Default)]
pub struct WRITE3resok {
    pub file_wcc: wcc_data,
    pub count: count3,
    pub committed: stable_how,
    pub verf: writeverf3,
}
SerializeStruct!(WRITE3resok, file_wcc, count, committed, verf);
DeserializeStruct!(WRITE3resok, file_wcc, count, committed, verf);

/// CREATE dispositions. EXCLUSIVE carries a verifier instead of
/// attributes so a retried create can be recognized.
#[derive(Clone, Debug)]
pub enum createhow3 {
    UNCHECKED(sattr3),
    GUARDED(sattr3),
    EXCLUSIVE(createverf3),
}

impl Default for createhow3 {
    fn default() -> createhow3 {
        createhow3::UNCHECKED(sattr3::default())
    }
}

impl Serialize for createhow3 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            createhow3::UNCHECKED(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            createhow3::GUARDED(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
            createhow3::EXCLUSIVE(v) => {
                2_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for createhow3 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32>(src)? {
            0 => *self = createhow3::UNCHECKED(deserialize(src)?),
            1 => *self = createhow3::GUARDED(deserialize(src)?),
            2 => *self = createhow3::EXCLUSIVE(deserialize(src)?),
            c => return Err(invalid_data(format!("invalid createmode {c}"))),
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct CREATE3args {
    pub r#where: diropargs3,
    pub how: createhow3,
}

impl Serialize for CREATE3args {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.r#where.serialize(dest)?;
        self.how.serialize(dest)
    }
}

impl Deserialize for CREATE3args {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.r#where.deserialize(src)?;
        self.how.deserialize(src)
    }
}

/// Success body shared by CREATE, MKDIR, SYMLINK and MKNOD.
#[derive(Clone, Debug, Default)]
pub struct CREATE3resok {
    pub obj: post_op_fh3,
    pub obj_attributes: post_op_attr,
    pub dir_wcc: wcc_data,
}
SerializeStruct!(CREATE3resok, obj, obj_attributes, dir_wcc);
DeserializeStruct!(CREATE3resok, obj, obj_attributes, dir_wcc);

#[derive(Clone, Debug, Default)]
pub struct MKDIR3args {
    pub r#where: diropargs3,
    pub attributes: sattr3,
}

impl Serialize for MKDIR3args {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.r#where.serialize(dest)?;
        self.attributes.serialize(dest)
    }
}

impl Deserialize for MKDIR3args {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.r#where.deserialize(src)?;
        self.attributes.deserialize(src)
    }
}

#[derive(Clone, Debug, Default)]
pub struct symlinkdata3 {
    pub symlink_attributes: sattr3,
    pub symlink_data: nfspath3,
}
SerializeStruct!(symlinkdata3, symlink_attributes, symlink_data);
DeserializeStruct!(symlinkdata3, symlink_attributes, symlink_data);

#[derive(Clone, Debug, Default)]
pub struct SYMLINK3args {
    pub r#where: diropargs3,
    pub symlink: symlinkdata3,
}

impl Serialize for SYMLINK3args {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.r#where.serialize(dest)?;
        self.symlink.serialize(dest)
    }
}

impl Deserialize for SYMLINK3args {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.r#where.deserialize(src)?;
        self.symlink.deserialize(src)
    }
}

/// Device node description for MKNOD.
#[derive(Clone, Debug, Default)]
pub struct devicedata3 {
    pub dev_attributes: sattr3,
    pub spec: specdata3,
}
SerializeStruct!(devicedata3, dev_attributes, spec);
DeserializeStruct!(devicedata3, dev_attributes, spec);

/// MKNOD payload discriminated by the requested file type.
#[derive(Clone, Debug)]
pub enum mknoddata3 {
    Device(ftype3, devicedata3),
    PipeOrSocket(ftype3, sattr3),
}

impl Default for mknoddata3 {
    fn default() -> mknoddata3 {
        mknoddata3::PipeOrSocket(ftype3::NF3FIFO, sattr3::default())
    }
}

impl Serialize for mknoddata3 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            mknoddata3::Device(ftype, data) => {
                ftype.serialize(dest)?;
                data.serialize(dest)
            }
            mknoddata3::PipeOrSocket(ftype, attrs) => {
                ftype.serialize(dest)?;
                attrs.serialize(dest)
            }
        }
    }
}

impl Deserialize for mknoddata3 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let ftype = deserialize::<ftype3>(src)?;
        match ftype {
            ftype3::NF3BLK | ftype3::NF3CHR => {
                *self = mknoddata3::Device(ftype, deserialize(src)?);
            }
            ftype3::NF3SOCK | ftype3::NF3FIFO => {
                *self = mknoddata3::PipeOrSocket(ftype, deserialize(src)?);
            }
            other => {
                return Err(invalid_data(format!("invalid mknod type {other:?}")));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct MKNOD3args {
    pub r#where: diropargs3,
    pub what: mknoddata3,
}

impl Serialize for MKNOD3args {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.r#where.serialize(dest)?;
        self.what.serialize(dest)
    }
}

impl Deserialize for MKNOD3args {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.r#where.deserialize(src)?;
        self.what.deserialize(src)
    }
}

#[derive(Clone, Debug, Default)]
pub struct RENAME3args {
    pub from: diropargs3,
    pub to: diropargs3,
}
SerializeStruct!(RENAME3args, from, to);
DeserializeStruct!(RENAME3args, from, to);

#[derive(Clone, Debug, Default)]
pub struct LINK3args {
    pub file: nfs_fh3,
    pub link: diropargs3,
}
SerializeStruct!(LINK3args, file, link);
DeserializeStruct!(LINK3args, file, link);

#[derive(Clone, Debug, Default)]
pub struct COMMIT3args {
    pub file: nfs_fh3,
    pub offset: offset3,
    pub count: count3,
}
SerializeStruct!(COMMIT3args, file, offset, count);
DeserializeStruct!(COMMIT3args, file, offset, count);

#[derive(Clone, Debug, Default)]
pub struct COMMIT3resok {
    pub file_wcc: wcc_data,
    pub verf: writeverf3,
}
SerializeStruct!(COMMIT3resok, file_wcc, verf);
DeserializeStruct!(COMMIT3resok, file_wcc, verf);
