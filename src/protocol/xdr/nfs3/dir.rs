//! Argument and result structures for READDIR and READDIRPLUS.
//!
//! Directory replies are byte-budgeted rather than entry-budgeted: the
//! handler truncates the entry chain to the client's `count`/`maxcount`
//! limits, so the entry lists here are chained manually with the XDR
//! list convention when encoding.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use super::*;

#[derive(Clone, Debug, Default)]
pub struct READDIR3args {
    pub dir: nfs_fh3,
    pub cookie: cookie3,
    pub cookieverf: cookieverf3,
    pub count: count3,
}
SerializeStruct!(READDIR3args, dir, cookie, cookieverf, count);
DeserializeStruct!(READDIR3args, dir, cookie, cookieverf, count);

/// One READDIR entry. Entries are chained on the wire; the chain bool is
/// written by the handler.
#[derive(Clone, Debug, Default)]
pub struct entry3 {
    pub fileid: fileid3,
    pub name: filename3,
    pub cookie: cookie3,
}
SerializeStruct!(entry3, fileid, name, cookie);
DeserializeStruct!(entry3, fileid, name, cookie);

#[derive(Clone, Debug, Default)]
pub struct READDIRPLUS3args {
    pub dir: nfs_fh3,
    pub cookie: cookie3,
    pub cookieverf: cookieverf3,
    pub dircount: count3,
    pub maxcount: count3,
}
SerializeStruct!(READDIRPLUS3args, dir, cookie, cookieverf, dircount, maxcount);
DeserializeStruct!(READDIRPLUS3args, dir, cookie, cookieverf, dircount, maxcount);

/// One READDIRPLUS entry: the plain entry plus optional attributes and
/// handle for the named object.
#[derive(Clone, Debug, Default)]
pub struct entryplus3 {
    pub fileid: fileid3,
    pub name: filename3,
    pub cookie: cookie3,
    pub name_attributes: post_op_attr,
    pub name_handle: post_op_fh3,
}
SerializeStruct!(entryplus3, fileid, name, cookie, name_attributes, name_handle);
DeserializeStruct!(entryplus3, fileid, name, cookie, name_attributes, name_handle);
