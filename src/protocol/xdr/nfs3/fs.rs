//! Argument and result structures for the file-system level procedures:
//! FSSTAT, FSINFO and PATHCONF.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use super::*;

/// FSINFO property bit: the server supports hard links.
pub const FSF_LINK: u32 = 0x0001;
/// FSINFO property bit: the server supports symbolic links.
pub const FSF_SYMLINK: u32 = 0x0002;
/// FSINFO property bit: PATHCONF results are valid for all files.
pub const FSF_HOMOGENEOUS: u32 = 0x0008;
/// FSINFO property bit: the server can set file times via SETATTR.
pub const FSF_CANSETTIME: u32 = 0x0010;

#[derive(Clone, Debug, Default)]
pub struct FSSTAT3resok {
    pub obj_attributes: post_op_attr,
    /// Total bytes on the file system.
    pub tbytes: size3,
    /// Free bytes.
    pub fbytes: size3,
    /// Bytes available to the caller.
    pub abytes: size3,
    /// Total file slots.
    pub tfiles: size3,
    /// Free file slots.
    pub ffiles: size3,
    /// File slots available to the caller.
    pub afiles: size3,
    /// Seconds the values are expected to stay valid.
    pub invarsec: u32,
}
SerializeStruct!(
    FSSTAT3resok, obj_attributes, tbytes, fbytes, abytes, tfiles, ffiles, afiles, invarsec
);
DeserializeStruct!(
    FSSTAT3resok, obj_attributes, tbytes, fbytes, abytes, tfiles, ffiles, afiles, invarsec
);

#[derive(Clone, Debug, Default)]
pub struct FSINFO3resok {
    pub obj_attributes: post_op_attr,
    /// Maximum READ request size.
    pub rtmax: u32,
    /// Preferred READ request size.
    pub rtpref: u32,
    /// Suggested READ size multiple.
    pub rtmult: u32,
    /// Maximum WRITE request size.
    pub wtmax: u32,
    /// Preferred WRITE request size.
    pub wtpref: u32,
    /// Suggested WRITE size multiple.
    pub wtmult: u32,
    /// Preferred READDIR request size.
    pub dtpref: u32,
    /// Maximum file size.
    pub maxfilesize: size3,
    /// Server time granularity.
    pub time_delta: nfstime3,
    /// FSF_* property bits.
    pub properties: u32,
}
SerializeStruct!(
    FSINFO3resok,
    obj_attributes,
    rtmax,
    rtpref,
    rtmult,
    wtmax,
    wtpref,
    wtmult,
    dtpref,
    maxfilesize,
    time_delta,
    properties
);
DeserializeStruct!(
    FSINFO3resok,
    obj_attributes,
    rtmax,
    rtpref,
    rtmult,
    wtmax,
    wtpref,
    wtmult,
    dtpref,
    maxfilesize,
    time_delta,
    properties
);

#[derive(Clone, Debug, Default)]
pub struct PATHCONF3resok {
    pub obj_attributes: post_op_attr,
    pub linkmax: u32,
    pub name_max: u32,
    pub no_trunc: bool,
    pub chown_restricted: bool,
    pub case_insensitive: bool,
    pub case_preserving: bool,
}
SerializeStruct!(
    PATHCONF3resok,
    obj_attributes,
    linkmax,
    name_max,
    no_trunc,
    chown_restricted,
    case_insensitive,
    case_preserving
);
DeserializeStruct!(
    PATHCONF3resok,
    obj_attributes,
    linkmax,
    name_max,
    no_trunc,
    chown_restricted,
    case_insensitive,
    case_preserving
);
