//! Portmap (RFC 1833 version 2) wire types.
//!
//! The portmapper maps `(program, version, protocol)` triples to port
//! numbers. DUMP uses the XDR linked-list convention: each entry is
//! prefixed by a TRUE boolean, the list ends with FALSE.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};

use super::*;

/// Portmap RPC program number.
pub const PROGRAM: u32 = 100000;
/// Portmap protocol version served here.
pub const VERSION: u32 = 2;

/// Protocol number for TCP.
pub const IPPROTO_TCP: u32 = 6;
/// Protocol number for UDP.
pub const IPPROTO_UDP: u32 = 17;

/// Procedure numbers of the portmap program.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum PortmapProc {
    PMAPPROC_NULL = 0,
    PMAPPROC_SET = 1,
    PMAPPROC_UNSET = 2,
    PMAPPROC_GETPORT = 3,
    PMAPPROC_DUMP = 4,
    PMAPPROC_CALLIT = 5,
    INVALID = 6,
}

/// A single program-to-port mapping.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct mapping {
    pub prog: u32,
    pub vers: u32,
    pub prot: u32,
    pub port: u32,
}
SerializeStruct!(mapping, prog, vers, prot, port);
DeserializeStruct!(mapping, prog, vers, prot, port);

/// Reply body of DUMP: a chained list of mappings.
#[derive(Clone, Debug, Default)]
pub struct pmaplist {
    pub entries: Vec<mapping>,
}

impl Serialize for pmaplist {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        for entry in &self.entries {
            true.serialize(dest)?;
            entry.serialize(dest)?;
        }
        false.serialize(dest)
    }
}

impl Deserialize for pmaplist {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.entries.clear();
        while deserialize::<bool>(src)? {
            self.entries.push(deserialize(src)?);
        }
        Ok(())
    }
}

/// Arguments of CALLIT: a target procedure plus its marshalled arguments.
#[derive(Clone, Debug, Default)]
pub struct call_args {
    pub prog: u32,
    pub vers: u32,
    pub proc: u32,
    pub args: Vec<u8>,
}
SerializeStruct!(call_args, prog, vers, proc, args);
DeserializeStruct!(call_args, prog, vers, proc, args);

/// Reply of CALLIT: the port the call was forwarded to (0 when refused)
/// and the marshalled results.
#[derive(Clone, Debug, Default)]
pub struct call_result {
    pub port: u32,
    pub res: Vec<u8>,
}
SerializeStruct!(call_result, port, res);
DeserializeStruct!(call_result, port, res);
