//! Per-call execution context.
//!
//! A [`Context`] bundles the capability references every handler needs:
//! the VFS backend, the shared registries (handle table, security
//! manager, access tracker, NFSv4 state, portmap and mount tables) and
//! the identity of the caller. The listener builds one per connection;
//! the dispatcher clones it per call and fills in the authenticated
//! [`SecurityContext`].

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::access::AccessTracker;
use crate::config::Config;
use crate::handle::HandleTable;
use crate::protocol::nfs::mount::MountTable;
use crate::protocol::nfs::portmap::PortmapTable;
use crate::security::{SecurityContext, SecurityManager};
use crate::state::StateTable;
use crate::vfs::VfsBackend;

/// Transport a call arrived on; error handling differs between the two.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

/// In-flight request gauge shared by every connection. When the count
/// passes the high-water mark, handlers answer with the per-version
/// "retry later" status instead of queueing more work.
pub struct ServerLoad {
    inflight: AtomicUsize,
    high_water: usize,
}

impl ServerLoad {
    pub fn new(high_water: usize) -> ServerLoad {
        ServerLoad { inflight: AtomicUsize::new(0), high_water: high_water.max(1) }
    }

    /// Registers an in-flight request; the guard releases it on drop.
    pub fn track(self: &Arc<Self>) -> LoadGuard {
        self.inflight.fetch_add(1, Ordering::SeqCst);
        LoadGuard { load: self.clone() }
    }

    pub fn overloaded(&self) -> bool {
        self.inflight.load(Ordering::SeqCst) > self.high_water
    }
}

pub struct LoadGuard {
    load: Arc<ServerLoad>,
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.load.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything a protocol handler may touch while serving one call.
#[derive(Clone)]
pub struct Context {
    /// Port the server is bound to, advertised by the portmapper.
    pub local_port: u16,
    /// Peer address of the call.
    pub client_addr: SocketAddr,
    pub transport: Transport,
    pub config: Arc<Config>,
    pub vfs: Arc<dyn VfsBackend>,
    pub handles: Arc<HandleTable>,
    pub security: Arc<SecurityManager>,
    pub access: Arc<AccessTracker>,
    pub state: Arc<StateTable>,
    pub portmap: Arc<PortmapTable>,
    pub mounts: Arc<MountTable>,
    pub load: Arc<ServerLoad>,
    /// Identity of the current call, replaced by the dispatcher after
    /// authentication.
    pub sec: SecurityContext,
}

impl Context {
    pub fn client_ip(&self) -> IpAddr {
        self.client_addr.ip()
    }

    /// Stable owner key used by the v2/v3 access tracker.
    pub fn client_owner(&self) -> Vec<u8> {
        self.client_addr.ip().to_string().into_bytes()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("rpc::Context")
            .field("local_port", &self.local_port)
            .field("client_addr", &self.client_addr)
            .field("transport", &self.transport)
            .field("uid", &self.sec.uid)
            .finish()
    }
}
