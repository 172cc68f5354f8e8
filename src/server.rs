//! Server assembly: the TCP and UDP listeners, the shared registries,
//! and the background sweepers that reclaim idle state.
//!
//! Error planes at the transport level: a malformed record or RPC
//! envelope on TCP closes that connection; on UDP the datagram is
//! dropped silently. Neither produces an RPC reply.

use std::io::Cursor;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::access::AccessTracker;
use crate::config::Config;
use crate::handle::HandleTable;
use crate::protocol::nfs::mount::{self, MountTable};
use crate::protocol::nfs::portmap::PortmapTable;
use crate::protocol::rpc::{self, Context, ServerLoad, Transport};
use crate::protocol::xdr::{nfs2, nfs3, nfs4, portmap};
use crate::security::{SecurityContext, SecurityManager};
use crate::state::StateTable;
use crate::vfs::VfsBackend;

/// Largest UDP datagram a call may occupy.
const MAX_UDP_DATAGRAM: usize = 65_507;

/// A bound NFS server with its shared registries.
pub struct NfsServer {
    config: Arc<Config>,
    vfs: Arc<dyn VfsBackend>,
    handles: Arc<HandleTable>,
    security: Arc<SecurityManager>,
    access: Arc<AccessTracker>,
    state: Arc<StateTable>,
    portmap: Arc<PortmapTable>,
    mounts: Arc<MountTable>,
    load: Arc<ServerLoad>,
    tcp: Option<TcpListener>,
    udp: Option<UdpSocket>,
    port: u16,
}

impl NfsServer {
    /// Validates the configuration, builds the shared registries, binds
    /// the enabled transports and registers this server's programs in
    /// its own portmap table.
    pub async fn bind(config: Config, vfs: Arc<dyn VfsBackend>) -> anyhow::Result<NfsServer> {
        config.validate()?;
        let config = Arc::new(config);

        let security = Arc::new(SecurityManager::new(config.clone())?);
        let handles = Arc::new(HandleTable::new(config.cache_size));
        let access = Arc::new(AccessTracker::new(config.file_access_timeout));
        let state = Arc::new(StateTable::new(config.session_timeout));
        let portmap = Arc::new(PortmapTable::new(
            config.portmap_max_mappings,
            config.portmap_mapping_timeout,
        ));
        let mounts = Arc::new(MountTable::default());

        let bind_addr = SocketAddr::new(config.bind_address, config.port);
        let tcp = if config.enable_tcp {
            let listener = TcpListener::bind(bind_addr)
                .await
                .with_context(|| format!("binding TCP {bind_addr}"))?;
            info!("listening on tcp://{}", listener.local_addr()?);
            Some(listener)
        } else {
            None
        };
        let port = tcp
            .as_ref()
            .and_then(|l| l.local_addr().ok())
            .map(|a| a.port())
            .unwrap_or(config.port);
        let udp = if config.enable_udp {
            let socket = UdpSocket::bind(SocketAddr::new(config.bind_address, port))
                .await
                .with_context(|| format!("binding UDP {bind_addr}"))?;
            info!("listening on udp://{}", socket.local_addr()?);
            Some(socket)
        } else {
            None
        };

        let load = Arc::new(ServerLoad::new(config.thread_pool_size * 8));
        let server = NfsServer {
            config,
            vfs,
            handles,
            security,
            access,
            state,
            portmap,
            mounts,
            load,
            tcp,
            udp,
            port,
        };
        server.register_programs();
        server.spawn_sweepers();
        Ok(server)
    }

    fn register_programs(&self) {
        let owner = "nfs-taiga";
        let protos: &[u32] = match (self.config.enable_tcp, self.config.enable_udp) {
            (true, true) => &[portmap::IPPROTO_TCP, portmap::IPPROTO_UDP],
            (true, false) => &[portmap::IPPROTO_TCP],
            (false, true) => &[portmap::IPPROTO_UDP],
            (false, false) => &[],
        };
        for proto in protos {
            if self.config.enable_nfsv2 {
                self.portmap.set(nfs2::PROGRAM, nfs2::VERSION, *proto, self.port, owner);
            }
            if self.config.enable_nfsv3 {
                self.portmap.set(nfs3::PROGRAM, nfs3::VERSION, *proto, self.port, owner);
            }
            if self.config.enable_nfsv4 {
                self.portmap.set(nfs4::PROGRAM, nfs4::VERSION, *proto, self.port, owner);
            }
            for vers in mount::VERSION_RANGE {
                self.portmap.set(mount::PROGRAM, vers, *proto, self.port, owner);
            }
            self.portmap.set(portmap::PROGRAM, portmap::VERSION, *proto, self.port, owner);
        }
    }

    /// Background reclamation: expired access records, security
    /// sessions, v4 leases (releasing their handle pins) and portmap
    /// mappings.
    fn spawn_sweepers(&self) {
        let interval = self.config.cleanup_interval;
        let access = self.access.clone();
        let security = self.security.clone();
        let state = self.state.clone();
        let handles = self.handles.clone();
        let portmap = self.portmap.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let dropped_access = access.sweep();
                let dropped_sessions = security.sweep_sessions();
                let released = state.sweep();
                for id in &released {
                    handles.unpin(*id);
                }
                let dropped_mappings = portmap.cleanup();
                if dropped_access + dropped_sessions + released.len() + dropped_mappings > 0 {
                    debug!(
                        dropped_access,
                        dropped_sessions,
                        released = released.len(),
                        dropped_mappings,
                        "sweeper pass"
                    );
                }
            }
        });
    }

    /// Port actually bound, useful after binding port 0.
    pub fn local_port(&self) -> u16 {
        self.port
    }

    pub fn local_ip(&self) -> IpAddr {
        self.config.bind_address
    }

    /// Connection-scoped context handed to the dispatcher.
    fn context_for(&self, client_addr: SocketAddr, transport: Transport) -> Context {
        Context {
            local_port: self.port,
            client_addr,
            transport,
            config: self.config.clone(),
            vfs: self.vfs.clone(),
            handles: self.handles.clone(),
            security: self.security.clone(),
            access: self.access.clone(),
            state: self.state.clone(),
            portmap: self.portmap.clone(),
            mounts: self.mounts.clone(),
            load: self.load.clone(),
            sec: SecurityContext::anonymous(
                client_addr.ip(),
                self.config.anon_uid,
                self.config.anon_gid,
            ),
        }
    }

    /// Serves both transports until the listeners fail.
    pub async fn handle_forever(&self) -> anyhow::Result<()> {
        let connections = Arc::new(Semaphore::new(self.config.max_connections));
        tokio::select! {
            result = self.serve_tcp(connections), if self.tcp.is_some() => result,
            result = self.serve_udp(), if self.udp.is_some() => result,
        }
    }

    async fn serve_tcp(&self, connections: Arc<Semaphore>) -> anyhow::Result<()> {
        let listener = self.tcp.as_ref().expect("serve_tcp without a listener");
        loop {
            // Holding the accept until a permit frees enforces
            // max_connections as backpressure, not as an error.
            let permit = connections.clone().acquire_owned().await?;
            let (socket, peer) = listener.accept().await?;
            let context = self.context_for(peer, Transport::Tcp);
            info!("accepting connection from {peer}");
            tokio::spawn(async move {
                if let Err(e) = process_socket(socket, context).await {
                    debug!("connection {peer} closed: {e:?}");
                }
                drop(permit);
            });
        }
    }

    async fn serve_udp(&self) -> anyhow::Result<()> {
        let socket = self.udp.as_ref().expect("serve_udp without a socket");
        let mut buf = vec![0_u8; MAX_UDP_DATAGRAM];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            let mut context = self.context_for(peer, Transport::Udp);
            let mut input = Cursor::new(&buf[..len]);
            let mut output = Vec::new();
            match rpc::handle_rpc(&mut input, &mut output, &mut context).await {
                Ok(true) => {
                    if let Err(e) = socket.send_to(&output, peer).await {
                        warn!("UDP reply to {peer} failed: {e:?}");
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    // Malformed datagrams are dropped without a reply.
                    debug!("dropping malformed datagram from {peer}: {e:?}");
                }
            }
        }
    }
}

/// Drives one TCP connection: raw bytes feed the record pump, replies
/// are framed back in handler completion order.
async fn process_socket(
    mut socket: tokio::net::TcpStream,
    context: Context,
) -> Result<(), anyhow::Error> {
    let (mut message_handler, mut socksend, mut replies) =
        rpc::SocketMessageHandler::new(&context);
    let _ = socket.set_nodelay(true);

    tokio::spawn(async move {
        loop {
            if let Err(e) = message_handler.read().await {
                debug!("record pump stopped: {e:?}");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            readable = socket.readable() => {
                readable?;
                let mut buf = [0; 128_000];
                match socket.try_read(&mut buf) {
                    Ok(0) => return Ok(()),
                    Ok(n) => {
                        socksend.write_all(&buf[..n]).await?;
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e.into()),
                }
            }
            reply = replies.recv() => {
                match reply {
                    Some(Ok(msg)) => {
                        if let Err(e) = rpc::write_fragment(&mut socket, &msg).await {
                            error!("write error: {e:?}");
                            return Err(e);
                        }
                    }
                    Some(Err(e)) => {
                        debug!("closing connection: {e:?}");
                        return Err(e);
                    }
                    None => {
                        return Err(anyhow::anyhow!("reply channel closed unexpectedly"));
                    }
                }
            }
        }
    }
}
