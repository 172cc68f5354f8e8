//! Shared test fixtures: an in-memory [`VfsBackend`] and a harness that
//! drives RPC calls through the dispatcher without touching sockets.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use nfs_taiga::access::AccessTracker;
use nfs_taiga::config::Config;
use nfs_taiga::handle::HandleTable;
use nfs_taiga::protocol::nfs::mount::MountTable;
use nfs_taiga::protocol::nfs::portmap::PortmapTable;
use nfs_taiga::protocol::rpc::{self, Context, ServerLoad, Transport};
use nfs_taiga::security::{SecurityContext, SecurityManager};
use nfs_taiga::state::StateTable;
use nfs_taiga::vfs::{
    FileKind, FileStat, FsStat, SetAttrs, SetTime, Timestamp, VfsBackend, VfsDirEntry, VfsError,
    VfsResult,
};
use nfs_taiga::xdr::{self, deserialize, Serialize};

pub const EXPORT_ROOT: &str = "/export";
pub const TEST_UID: u32 = 1000;
pub const TEST_GID: u32 = 1000;

#[derive(Clone)]
struct Node {
    stat: FileStat,
    data: Vec<u8>,
    target: Vec<u8>,
}

/// In-memory path-keyed file system.
pub struct MemFs {
    nodes: Mutex<HashMap<PathBuf, Node>>,
    next_fileid: AtomicU64,
    pub write_calls: AtomicUsize,
}

impl MemFs {
    pub fn new() -> MemFs {
        let fs = MemFs {
            nodes: Mutex::new(HashMap::new()),
            next_fileid: AtomicU64::new(1),
            write_calls: AtomicUsize::new(0),
        };
        fs.insert_node(Path::new(EXPORT_ROOT), FileKind::Directory, 0o755, Vec::new());
        fs
    }

    fn new_stat(&self, kind: FileKind, mode: u32, size: u64) -> FileStat {
        let now = Timestamp::now();
        FileStat {
            kind,
            mode,
            nlink: if kind == FileKind::Directory { 2 } else { 1 },
            uid: TEST_UID,
            gid: TEST_GID,
            size,
            used: size,
            rdev: (0, 0),
            fsid: 1,
            fileid: self.next_fileid.fetch_add(1, Ordering::SeqCst),
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    fn insert_node(&self, path: &Path, kind: FileKind, mode: u32, data: Vec<u8>) -> FileStat {
        let stat = self.new_stat(kind, mode, data.len() as u64);
        self.nodes.lock().unwrap().insert(
            path.to_path_buf(),
            Node { stat, data, target: Vec::new() },
        );
        stat
    }

    /// Seeds a regular file for a test.
    pub fn add_file(&self, path: &str, content: &[u8]) {
        self.insert_node(Path::new(path), FileKind::Regular, 0o644, content.to_vec());
    }

    /// Seeds a directory for a test.
    pub fn add_dir(&self, path: &str) {
        self.insert_node(Path::new(path), FileKind::Directory, 0o755, Vec::new());
    }

    pub fn content_of(&self, path: &str) -> Option<Vec<u8>> {
        self.nodes.lock().unwrap().get(Path::new(path)).map(|n| n.data.clone())
    }

    /// Overrides the ownership of an existing node.
    pub fn chown(&self, path: &str, uid: u32, gid: u32) {
        if let Some(node) = self.nodes.lock().unwrap().get_mut(Path::new(path)) {
            node.stat.uid = uid;
            node.stat.gid = gid;
        }
    }

    fn has_children(&self, path: &Path) -> bool {
        self.nodes.lock().unwrap().keys().any(|k| k.parent() == Some(path))
    }
}

fn apply_times(stat: &mut FileStat, attrs: &SetAttrs) {
    let resolve = |t: &SetTime| match t {
        SetTime::ServerTime => Timestamp::now(),
        SetTime::ClientTime(ts) => *ts,
    };
    if let Some(atime) = &attrs.atime {
        stat.atime = resolve(atime);
    }
    if let Some(mtime) = &attrs.mtime {
        stat.mtime = resolve(mtime);
    }
}

#[async_trait]
impl VfsBackend for MemFs {
    async fn stat(&self, path: &Path) -> VfsResult<FileStat> {
        self.nodes.lock().unwrap().get(path).map(|n| n.stat).ok_or(VfsError::NotFound)
    }

    async fn setattr(&self, path: &Path, attrs: &SetAttrs) -> VfsResult<FileStat> {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes.get_mut(path).ok_or(VfsError::NotFound)?;
        if let Some(mode) = attrs.mode {
            node.stat.mode = mode & 0o7777;
        }
        if let Some(uid) = attrs.uid {
            node.stat.uid = uid;
        }
        if let Some(gid) = attrs.gid {
            node.stat.gid = gid;
        }
        if let Some(size) = attrs.size {
            node.data.resize(size as usize, 0);
            node.stat.size = size;
            node.stat.used = size;
        }
        apply_times(&mut node.stat, attrs);
        node.stat.ctime = Timestamp::now();
        Ok(node.stat)
    }

    async fn read(&self, path: &Path, offset: u64, count: u32) -> VfsResult<(Vec<u8>, bool)> {
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(path).ok_or(VfsError::NotFound)?;
        if node.stat.kind == FileKind::Directory {
            return Err(VfsError::IsDir);
        }
        let start = (offset as usize).min(node.data.len());
        let end = (start + count as usize).min(node.data.len());
        Ok((node.data[start..end].to_vec(), end == node.data.len()))
    }

    async fn write(&self, path: &Path, offset: u64, data: &[u8], _sync: bool)
        -> VfsResult<FileStat> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes.get_mut(path).ok_or(VfsError::NotFound)?;
        if node.stat.kind == FileKind::Directory {
            return Err(VfsError::IsDir);
        }
        let end = offset as usize + data.len();
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[offset as usize..end].copy_from_slice(data);
        node.stat.size = node.data.len() as u64;
        node.stat.used = node.stat.size;
        node.stat.mtime = Timestamp::now();
        node.stat.ctime = node.stat.mtime;
        Ok(node.stat)
    }

    async fn create(&self, path: &Path, mode: u32, exclusive: bool) -> VfsResult<FileStat> {
        if self.nodes.lock().unwrap().contains_key(path) {
            if exclusive {
                return Err(VfsError::Exists);
            }
            return self.stat(path).await;
        }
        Ok(self.insert_node(path, FileKind::Regular, mode & 0o7777, Vec::new()))
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileStat> {
        if self.nodes.lock().unwrap().contains_key(path) {
            return Err(VfsError::Exists);
        }
        Ok(self.insert_node(path, FileKind::Directory, mode & 0o7777, Vec::new()))
    }

    async fn remove(&self, path: &Path) -> VfsResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(node) if node.stat.kind == FileKind::Directory => Err(VfsError::IsDir),
            Some(_) => {
                nodes.remove(path);
                Ok(())
            }
            None => Err(VfsError::NotFound),
        }
    }

    async fn rmdir(&self, path: &Path) -> VfsResult<()> {
        if self.has_children(path) {
            return Err(VfsError::NotEmpty);
        }
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(node) if node.stat.kind != FileKind::Directory => Err(VfsError::NotDir),
            Some(_) => {
                nodes.remove(path);
                Ok(())
            }
            None => Err(VfsError::NotFound),
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        let moved: Vec<(PathBuf, PathBuf)> = nodes
            .keys()
            .filter(|k| k.as_path() == from || k.starts_with(from))
            .map(|k| {
                let suffix = k.strip_prefix(from).unwrap().to_path_buf();
                (k.clone(), to.join(suffix))
            })
            .collect();
        if moved.is_empty() {
            return Err(VfsError::NotFound);
        }
        for (old, new) in moved {
            let node = nodes.remove(&old).unwrap();
            nodes.insert(new, node);
        }
        Ok(())
    }

    async fn link(&self, existing: &Path, link: &Path) -> VfsResult<FileStat> {
        let mut nodes = self.nodes.lock().unwrap();
        let mut node = nodes.get(existing).cloned().ok_or(VfsError::NotFound)?;
        if nodes.contains_key(link) {
            return Err(VfsError::Exists);
        }
        node.stat.nlink += 1;
        if let Some(orig) = nodes.get_mut(existing) {
            orig.stat.nlink += 1;
        }
        let stat = node.stat;
        nodes.insert(link.to_path_buf(), node);
        Ok(stat)
    }

    async fn symlink(&self, target: &[u8], link: &Path) -> VfsResult<FileStat> {
        if self.nodes.lock().unwrap().contains_key(link) {
            return Err(VfsError::Exists);
        }
        let stat = self.insert_node(link, FileKind::Symlink, 0o777, Vec::new());
        self.nodes.lock().unwrap().get_mut(link).unwrap().target = target.to_vec();
        Ok(stat)
    }

    async fn readlink(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(path).ok_or(VfsError::NotFound)?;
        if node.stat.kind != FileKind::Symlink {
            return Err(VfsError::Invalid);
        }
        Ok(node.target.clone())
    }

    async fn readdir(&self, path: &Path) -> VfsResult<Vec<VfsDirEntry>> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(node) if node.stat.kind == FileKind::Directory => {}
            Some(_) => return Err(VfsError::NotDir),
            None => return Err(VfsError::NotFound),
        }
        let mut entries: Vec<VfsDirEntry> = nodes
            .iter()
            .filter(|(k, _)| k.parent() == Some(path))
            .map(|(k, node)| VfsDirEntry {
                name: k.file_name().unwrap().to_string_lossy().into_owned().into_bytes(),
                stat: node.stat,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn mknod(
        &self,
        path: &Path,
        kind: FileKind,
        rdev: (u32, u32),
        mode: u32,
    ) -> VfsResult<FileStat> {
        if self.nodes.lock().unwrap().contains_key(path) {
            return Err(VfsError::Exists);
        }
        let stat = self.insert_node(path, kind, mode & 0o7777, Vec::new());
        self.nodes.lock().unwrap().get_mut(path).unwrap().stat.rdev = rdev;
        Ok(stat)
    }

    async fn fsstat(&self, _path: &Path) -> VfsResult<FsStat> {
        Ok(FsStat::default())
    }

    fn root_path(&self) -> PathBuf {
        PathBuf::from(EXPORT_ROOT)
    }
}

/// Harness wiring the registries together the way the server does, but
/// driving calls through in-memory cursors.
pub struct TestServer {
    pub config: Arc<Config>,
    pub fs: Arc<MemFs>,
    pub handles: Arc<HandleTable>,
    pub security: Arc<SecurityManager>,
    pub access: Arc<AccessTracker>,
    pub state: Arc<StateTable>,
    pub portmap: Arc<PortmapTable>,
    pub mounts: Arc<MountTable>,
    pub load: Arc<ServerLoad>,
}

impl TestServer {
    pub fn new() -> TestServer {
        TestServer::with_config(Config {
            root_path: PathBuf::from(EXPORT_ROOT),
            ..Config::default()
        })
    }

    pub fn with_config(config: Config) -> TestServer {
        let config = Arc::new(config);
        let fs = Arc::new(MemFs::new());
        let server = TestServer {
            security: Arc::new(SecurityManager::new(config.clone()).unwrap()),
            handles: Arc::new(HandleTable::new(config.cache_size)),
            access: Arc::new(AccessTracker::new(config.file_access_timeout)),
            state: Arc::new(StateTable::new(config.session_timeout)),
            portmap: Arc::new(PortmapTable::default()),
            mounts: Arc::new(MountTable::default()),
            load: Arc::new(ServerLoad::new(config.thread_pool_size * 8)),
            config,
            fs,
        };
        // Register the NFS programs on the conventional port the way
        // server startup does.
        for proto in [xdr::portmap::IPPROTO_TCP, xdr::portmap::IPPROTO_UDP] {
            server.portmap.set(xdr::nfs3::PROGRAM, 2, proto, 2049, "test");
            server.portmap.set(xdr::nfs3::PROGRAM, 3, proto, 2049, "test");
            server.portmap.set(xdr::nfs3::PROGRAM, 4, proto, 2049, "test");
            server.portmap.set(xdr::portmap::PROGRAM, 2, proto, 111, "test");
        }
        server
    }

    pub fn context(&self, client: &str) -> Context {
        let client_addr: SocketAddr = client.parse().unwrap();
        Context {
            local_port: 2049,
            client_addr,
            transport: Transport::Tcp,
            config: self.config.clone(),
            vfs: self.fs.clone(),
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

    /// AUTH_SYS credential body for a caller.
    pub fn sys_cred(uid: u32, gid: u32) -> xdr::rpc::opaque_auth {
        let parms = xdr::rpc::auth_sys_parms {
            stamp: 1,
            machinename: b"testhost".to_vec(),
            uid,
            gid,
            gids: vec![gid],
        };
        let mut body = Vec::new();
        parms.serialize(&mut body).unwrap();
        xdr::rpc::opaque_auth { flavor: xdr::rpc::auth_flavor::AUTH_SYS, body }
    }

    /// Runs one call through the dispatcher, returning the raw reply.
    pub async fn call_raw(
        &self,
        client: &str,
        rpcvers: u32,
        prog: u32,
        vers: u32,
        proc: u32,
        cred: xdr::rpc::opaque_auth,
        args: &[u8],
    ) -> Vec<u8> {
        let msg = xdr::rpc::rpc_msg {
            xid: 0x5ca1e,
            body: xdr::rpc::rpc_body::CALL(xdr::rpc::call_body {
                rpcvers,
                prog,
                vers,
                proc,
                cred,
                verf: xdr::rpc::opaque_auth::default(),
            }),
        };
        let mut request = Vec::new();
        msg.serialize(&mut request).unwrap();
        request.extend_from_slice(args);

        let mut context = self.context(client);
        let mut input = Cursor::new(request);
        let mut output = Vec::new();
        let replied = rpc::handle_rpc(&mut input, &mut output, &mut context)
            .await
            .expect("dispatcher error");
        assert!(replied, "expected a reply");
        output
    }

    /// Standard authenticated call as the test user.
    pub async fn call(&self, prog: u32, vers: u32, proc: u32, args: &[u8]) -> Vec<u8> {
        self.call_raw("10.0.0.1:700", 2, prog, vers, proc, Self::sys_cred(TEST_UID, TEST_GID),
                      args)
            .await
    }

    /// Same as [`call`] but with a chosen uid/gid and source address.
    pub async fn call_as(
        &self,
        client: &str,
        uid: u32,
        gid: u32,
        prog: u32,
        vers: u32,
        proc: u32,
        args: &[u8],
    ) -> Vec<u8> {
        self.call_raw(client, 2, prog, vers, proc, Self::sys_cred(uid, gid), args).await
    }
}

/// Splits a reply into its decoded RPC message and a cursor positioned
/// at the procedure results.
pub fn open_reply(reply: &[u8]) -> (xdr::rpc::rpc_msg, Cursor<&[u8]>) {
    let mut cursor = Cursor::new(reply);
    let msg = deserialize::<xdr::rpc::rpc_msg>(&mut cursor).expect("reply header");
    (msg, cursor)
}

/// Asserts the reply is MSG_ACCEPTED/SUCCESS and returns the cursor at
/// the procedure results.
pub fn expect_success(reply: &[u8]) -> Cursor<&[u8]> {
    let (msg, cursor) = open_reply(reply);
    match msg.body {
        xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_ACCEPTED(accepted)) => {
            assert_eq!(accepted.reply_data, xdr::rpc::accept_body::SUCCESS,
                       "expected SUCCESS, got {:?}", accepted.reply_data);
        }
        other => panic!("expected MSG_ACCEPTED, got {other:?}"),
    }
    cursor
}

/// Fetches the export root handle through MOUNT v3.
pub async fn mount_root(server: &TestServer) -> Vec<u8> {
    let mut args = Vec::new();
    "/".to_string().serialize(&mut args).unwrap();
    let reply = server
        .call(nfs_taiga::protocol::nfs::mount::PROGRAM, 3, 1, &args)
        .await;
    let mut body = expect_success(&reply);
    let status = deserialize::<u32>(&mut body).unwrap();
    assert_eq!(status, 0, "mount failed");
    deserialize::<Vec<u8>>(&mut body).unwrap()
}
