//! PORTMAP program (RFC 1833 version 2): the registry mapping RPC
//! program/version/protocol triples to ports, and its six procedures.
//!
//! The server registers its own NFS versions here at startup. CALLIT is
//! deliberately crippled: the portmapper's indirect-call facility is a
//! classic reflection amplifier, so only the NULL procedure of locally
//! registered programs is forwarded; everything else answers with port
//! zero and empty results.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use num_traits::cast::FromPrimitive;
use tracing::warn;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, portmap, Serialize};

mod callit;
mod dump;
mod get_port;
mod null;
mod set;
mod unset;

use callit::pmapproc_callit;
use dump::pmapproc_dump;
use get_port::pmapproc_getport;
use null::pmapproc_null;
use set::pmapproc_set;
use unset::pmapproc_unset;

/// Default bound on the number of registered mappings.
pub const DEFAULT_MAX_MAPPINGS: usize = 256;

/// A registered mapping with its bookkeeping.
#[derive(Clone, Debug)]
pub struct PortmapEntry {
    pub port: u16,
    pub owner: String,
    pub created_at: SystemTime,
}

/// The program→port registry.
pub struct PortmapTable {
    entries: Mutex<HashMap<(u32, u32, u32), PortmapEntry>>,
    max_mappings: usize,
    /// Mappings older than this are dropped by `cleanup`; disabled when
    /// `None`.
    mapping_timeout: Option<Duration>,
}

impl Default for PortmapTable {
    fn default() -> PortmapTable {
        PortmapTable::new(DEFAULT_MAX_MAPPINGS, None)
    }
}

impl PortmapTable {
    pub fn new(max_mappings: usize, mapping_timeout: Option<Duration>) -> PortmapTable {
        PortmapTable {
            entries: Mutex::new(HashMap::new()),
            max_mappings,
            mapping_timeout,
        }
    }

    /// SET: registers a mapping. Zero programs and ports are refused, as
    /// is a duplicate key bound to a different port.
    pub fn set(&self, prog: u32, vers: u32, prot: u32, port: u16, owner: &str) -> bool {
        if prog == 0 || port == 0 || !(prot == portmap::IPPROTO_TCP || prot == portmap::IPPROTO_UDP)
        {
            return false;
        }
        let mut entries = self.entries.lock().expect("portmap table poisoned");
        if let Some(existing) = entries.get(&(prog, vers, prot)) {
            return existing.port == port;
        }
        if entries.len() >= self.max_mappings {
            warn!(prog, vers, prot, "portmap table full");
            return false;
        }
        entries.insert(
            (prog, vers, prot),
            PortmapEntry { port, owner: owner.to_string(), created_at: SystemTime::now() },
        );
        true
    }

    /// UNSET: removes every protocol's mapping of `(prog, vers)`.
    pub fn unset(&self, prog: u32, vers: u32) -> bool {
        let mut entries = self.entries.lock().expect("portmap table poisoned");
        let before = entries.len();
        entries.retain(|(p, v, _), _| !(*p == prog && *v == vers));
        entries.len() != before
    }

    /// GETPORT: port for a triple, zero when absent.
    pub fn get_port(&self, prog: u32, vers: u32, prot: u32) -> u16 {
        let entries = self.entries.lock().expect("portmap table poisoned");
        entries.get(&(prog, vers, prot)).map(|e| e.port).unwrap_or(0)
    }

    /// DUMP: all current mappings.
    pub fn dump(&self) -> Vec<portmap::mapping> {
        let entries = self.entries.lock().expect("portmap table poisoned");
        let mut list: Vec<portmap::mapping> = entries
            .iter()
            .map(|((prog, vers, prot), entry)| portmap::mapping {
                prog: *prog,
                vers: *vers,
                prot: *prot,
                port: entry.port as u32,
            })
            .collect();
        list.sort_by_key(|m| (m.prog, m.vers, m.prot));
        list
    }

    /// Whether `(prog, vers)` is registered on any protocol.
    pub fn is_registered(&self, prog: u32, vers: u32) -> bool {
        let entries = self.entries.lock().expect("portmap table poisoned");
        entries.keys().any(|(p, v, _)| *p == prog && *v == vers)
    }

    /// Drops mappings older than the configured timeout.
    pub fn cleanup(&self) -> usize {
        let Some(timeout) = self.mapping_timeout else {
            return 0;
        };
        let now = SystemTime::now();
        let mut entries = self.entries.lock().expect("portmap table poisoned");
        let before = entries.len();
        entries.retain(|_, e| {
            now.duration_since(e.created_at).map(|age| age < timeout).unwrap_or(true)
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("portmap table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dispatches one portmap call. The version was validated upstream.
pub fn handle_portmap(
    xid: u32,
    call: &xdr::rpc::call_body,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let proc =
        portmap::PortmapProc::from_u32(call.proc).unwrap_or(portmap::PortmapProc::INVALID);
    match proc {
        portmap::PortmapProc::PMAPPROC_NULL => pmapproc_null(xid, output)?,
        portmap::PortmapProc::PMAPPROC_SET => pmapproc_set(xid, input, output, context)?,
        portmap::PortmapProc::PMAPPROC_UNSET => pmapproc_unset(xid, input, output, context)?,
        portmap::PortmapProc::PMAPPROC_GETPORT => pmapproc_getport(xid, input, output, context)?,
        portmap::PortmapProc::PMAPPROC_DUMP => pmapproc_dump(xid, output, context)?,
        portmap::PortmapProc::PMAPPROC_CALLIT => pmapproc_callit(xid, input, output, context)?,
        portmap::PortmapProc::INVALID => {
            warn!("unknown portmap procedure {}", call.proc);
            xdr::rpc::proc_unavail_reply_message(xid).serialize(output)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_rejects_zero_and_duplicates() {
        let table = PortmapTable::default();
        assert!(!table.set(0, 2, portmap::IPPROTO_TCP, 111, "t"));
        assert!(!table.set(100003, 3, portmap::IPPROTO_TCP, 0, "t"));
        assert!(table.set(100003, 3, portmap::IPPROTO_TCP, 2049, "t"));
        // Re-registering the same port is idempotent, a different port
        // is refused.
        assert!(table.set(100003, 3, portmap::IPPROTO_TCP, 2049, "t"));
        assert!(!table.set(100003, 3, portmap::IPPROTO_TCP, 2050, "t"));
    }

    #[test]
    fn unset_removes_all_protocols() {
        let table = PortmapTable::default();
        table.set(100003, 3, portmap::IPPROTO_TCP, 2049, "t");
        table.set(100003, 3, portmap::IPPROTO_UDP, 2049, "t");
        assert!(table.unset(100003, 3));
        assert_eq!(table.get_port(100003, 3, portmap::IPPROTO_TCP), 0);
        assert_eq!(table.get_port(100003, 3, portmap::IPPROTO_UDP), 0);
    }

    #[test]
    fn capacity_is_enforced() {
        let table = PortmapTable::new(1, None);
        assert!(table.set(1, 1, portmap::IPPROTO_TCP, 10, "t"));
        assert!(!table.set(2, 1, portmap::IPPROTO_TCP, 11, "t"));
    }

    #[test]
    fn cleanup_drops_expired_mappings() {
        let table = PortmapTable::new(16, Some(Duration::from_millis(1)));
        table.set(100003, 3, portmap::IPPROTO_TCP, 2049, "t");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(table.cleanup(), 1);
        assert!(table.is_empty());
    }
}
