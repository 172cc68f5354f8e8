//! Security manager: request authentication, security sessions, the ACL
//! store with its evaluation rules, path containment checks and the
//! audit trail.
//!
//! Every RPC call passes through [`SecurityManager::authenticate`] to
//! obtain a [`SecurityContext`] before any handler runs. Handlers then
//! consult [`SecurityManager::check_access`] with the canonical path and
//! the permission bits the operation needs. Authentication results,
//! authorization decisions and file operations are appended to the audit
//! sink.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::net::IpAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::Context as _;
use num_traits::cast::FromPrimitive;
use rand::RngCore;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::protocol::xdr::rpc::{auth_flavor, auth_stat, auth_sys_parms, opaque_auth};
use crate::protocol::xdr::{deserialize, Deserialize, Serialize};
use crate::vfs::FileStat;
use crate::{DeserializeEnum, DeserializeStruct, SerializeEnum, SerializeStruct};

/// Permission bit: read.
pub const PERM_READ: u8 = 4;
/// Permission bit: write.
pub const PERM_WRITE: u8 = 2;
/// Permission bit: execute / traverse.
pub const PERM_EXEC: u8 = 1;

/// Maximum machine name length accepted in AUTH_SYS credentials.
const MAX_MACHINE_NAME: usize = 255;
/// Window within which a stamp regression from the same machine is
/// considered a replay.
const STAMP_WINDOW: Duration = Duration::from_secs(60);
/// Stamp regression tolerance in seconds.
const STAMP_DRIFT: u32 = 300;

/// Identity and provenance of a single RPC call.
#[derive(Clone, Debug, PartialEq)]
pub struct SecurityContext {
    pub authenticated: bool,
    pub uid: u32,
    pub gid: u32,
    pub gids: Vec<u32>,
    pub machine: String,
    pub client_ip: IpAddr,
    pub auth_flavor: auth_flavor,
    pub session_id: Option<[u8; 16]>,
    pub auth_time: SystemTime,
}

impl SecurityContext {
    /// Anonymous context used for AUTH_NONE calls.
    pub fn anonymous(client_ip: IpAddr, anon_uid: u32, anon_gid: u32) -> SecurityContext {
        SecurityContext {
            authenticated: false,
            uid: anon_uid,
            gid: anon_gid,
            gids: vec![anon_gid],
            machine: String::new(),
            client_ip,
            auth_flavor: auth_flavor::AUTH_NONE,
            session_id: None,
            auth_time: SystemTime::now(),
        }
    }

    /// Whether the context's groups include `gid`.
    pub fn in_group(&self, gid: u32) -> bool {
        self.gid == gid || self.gids.contains(&gid)
    }
}

/// Kind of an access control entry.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, num_derive::FromPrimitive,
         num_derive::ToPrimitive)]
#[repr(u32)]
pub enum AclKind {
    #[default]
    User = 1,
    Group = 2,
    Other = 3,
    Mask = 4,
}
SerializeEnum!(AclKind);
DeserializeEnum!(AclKind);

/// One access control entry: a principal and its rwx triple.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AclEntry {
    pub kind: AclKind,
    pub id: u32,
    /// rwx bits, 0..=7.
    pub permissions: u32,
    pub name: Option<String>,
}
SerializeStruct!(AclEntry, kind, id, permissions, name);
DeserializeStruct!(AclEntry, kind, id, permissions, name);

/// Ordered ACL of a single file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileAcl {
    pub entries: Vec<AclEntry>,
    pub default_mask: u32,
    pub is_directory: bool,
}

impl Serialize for FileAcl {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        (self.entries.len() as u32).serialize(dest)?;
        for entry in &self.entries {
            entry.serialize(dest)?;
        }
        self.default_mask.serialize(dest)?;
        self.is_directory.serialize(dest)
    }
}

impl Deserialize for FileAcl {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let count = deserialize::<u32>(src)? as usize;
        self.entries.clear();
        for _ in 0..count {
            self.entries.push(deserialize(src)?);
        }
        self.default_mask.deserialize(src)?;
        self.is_directory.deserialize(src)?;
        Ok(())
    }
}

impl FileAcl {
    /// Structural sanity: permission triples in range, at most one Other
    /// and one Mask entry.
    pub fn is_well_formed(&self) -> bool {
        let others = self.entries.iter().filter(|e| e.kind == AclKind::Other).count();
        let masks = self.entries.iter().filter(|e| e.kind == AclKind::Mask).count();
        others <= 1 && masks <= 1 && self.entries.iter().all(|e| e.permissions <= 7)
    }

    fn mask(&self) -> u32 {
        self.entries
            .iter()
            .find(|e| e.kind == AclKind::Mask)
            .map(|e| e.permissions)
            .unwrap_or(if self.default_mask > 0 { self.default_mask } else { 7 })
    }

    /// First-match evaluation in the order owner, named users, owning
    /// group, named groups, other. The matching entry alone decides; no
    /// fall-through.
    pub fn evaluate(&self, ctx: &SecurityContext, file_uid: u32, file_gid: u32, perms: u8) -> bool {
        let mask = self.mask();
        let want = perms as u32;

        if ctx.uid == file_uid {
            if let Some(e) =
                self.entries.iter().find(|e| e.kind == AclKind::User && e.id == file_uid)
            {
                return e.permissions & want == want;
            }
        }
        if let Some(e) = self
            .entries
            .iter()
            .find(|e| e.kind == AclKind::User && e.id != file_uid && e.id == ctx.uid)
        {
            return (e.permissions & mask) & want == want;
        }
        if ctx.in_group(file_gid) {
            if let Some(e) =
                self.entries.iter().find(|e| e.kind == AclKind::Group && e.id == file_gid)
            {
                return (e.permissions & mask) & want == want;
            }
        }
        if let Some(e) = self
            .entries
            .iter()
            .find(|e| e.kind == AclKind::Group && e.id != file_gid && ctx.in_group(e.id))
        {
            return (e.permissions & mask) & want == want;
        }
        if let Some(e) = self.entries.iter().find(|e| e.kind == AclKind::Other) {
            return e.permissions & want == want;
        }
        false
    }
}

/// One line of the audit trail.
#[derive(Clone, Debug)]
pub struct AuditEntry {
    pub timestamp: SystemTime,
    pub client: String,
    pub uid: u32,
    pub operation: String,
    pub path: String,
    pub success: bool,
    pub detail: String,
}

/// Destination of audit entries. Implementations must be safe to call
/// from concurrent handlers and durable in append mode.
pub trait AuditSink: Send {
    fn append(&mut self, entry: &AuditEntry) -> std::io::Result<()>;
}

/// Forwards audit entries to the `audit` tracing target.
#[derive(Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&mut self, entry: &AuditEntry) -> std::io::Result<()> {
        info!(
            target: "audit",
            client = %entry.client,
            uid = entry.uid,
            operation = %entry.operation,
            path = %entry.path,
            success = entry.success,
            detail = %entry.detail,
        );
        Ok(())
    }
}

/// Appends one line per entry to a file opened in append mode, flushing
/// after every write so entries survive a crash.
pub struct FileAuditSink {
    file: std::fs::File,
}

impl FileAuditSink {
    pub fn open(path: &Path) -> std::io::Result<FileAuditSink> {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(FileAuditSink { file })
    }
}

impl AuditSink for FileAuditSink {
    fn append(&mut self, entry: &AuditEntry) -> std::io::Result<()> {
        let when = entry
            .timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        writeln!(
            self.file,
            "{} client={} uid={} op={} path={} success={} {}",
            when, entry.client, entry.uid, entry.operation, entry.path, entry.success,
            entry.detail
        )?;
        self.file.sync_data()
    }
}

/// Why a name component was refused.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NameError {
    /// `..`, absolute names, embedded separators or NUL.
    Traversal,
    /// Empty name.
    Empty,
    /// Component longer than 255 bytes.
    TooLong,
}

/// Validates a single directory component and joins it onto `dir`.
/// `.` resolves to the directory itself.
pub fn join_component(dir: &Path, name: &[u8]) -> Result<PathBuf, NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_MACHINE_NAME {
        return Err(NameError::TooLong);
    }
    if name == b".." {
        return Err(NameError::Traversal);
    }
    if name.contains(&b'/') || name.contains(&0) {
        return Err(NameError::Traversal);
    }
    if name == b"." {
        return Ok(dir.to_path_buf());
    }
    let name = std::str::from_utf8(name).map_err(|_| NameError::Traversal)?;
    Ok(dir.join(name))
}

struct SecuritySession {
    ctx: SecurityContext,
    created: SystemTime,
    last_seen: SystemTime,
}

/// Shared security state: session table, ACL map, per-machine stamp
/// history and the audit sink.
pub struct SecurityManager {
    config: Arc<Config>,
    sessions: Mutex<HashMap<[u8; 16], SecuritySession>>,
    acls: Mutex<HashMap<PathBuf, FileAcl>>,
    stamps: Mutex<HashMap<String, (u32, SystemTime)>>,
    audit: Mutex<Box<dyn AuditSink>>,
}

impl SecurityManager {
    /// Builds the manager, selecting the audit sink from the
    /// configuration and loading the persisted ACL store when one is
    /// configured. A corrupt ACL store is a startup failure.
    pub fn new(config: Arc<Config>) -> anyhow::Result<SecurityManager> {
        let audit: Box<dyn AuditSink> = match &config.audit_log_file {
            Some(path) => Box::new(
                FileAuditSink::open(path)
                    .with_context(|| format!("opening audit log {path:?}"))?,
            ),
            None => Box::new(TracingAuditSink),
        };
        let manager = SecurityManager {
            config,
            sessions: Mutex::new(HashMap::new()),
            acls: Mutex::new(HashMap::new()),
            stamps: Mutex::new(HashMap::new()),
            audit: Mutex::new(audit),
        };
        if let Some(path) = manager.config.acl_store_path.clone() {
            if path.exists() {
                manager.load_acl_store(&path)?;
            }
        }
        Ok(manager)
    }

    /// Authenticates an RPC credential into a request context, applying
    /// root squashing. Flavors other than AUTH_NONE and AUTH_SYS are
    /// refused; the dispatcher turns the returned status into an
    /// `AUTH_ERROR` rejection. Every decision lands in the audit trail.
    pub fn authenticate(
        &self,
        cred: &opaque_auth,
        client_ip: IpAddr,
    ) -> Result<SecurityContext, auth_stat> {
        let result = match cred.flavor {
            auth_flavor::AUTH_NONE => {
                Ok(SecurityContext::anonymous(client_ip, self.config.anon_uid, self.config.anon_gid))
            }
            auth_flavor::AUTH_SYS if self.config.enable_auth_sys => {
                deserialize::<auth_sys_parms>(&mut Cursor::new(&cred.body))
                    .map_err(|_| auth_stat::AUTH_BADCRED)
                    .and_then(|parms| self.context_from_sys(parms, client_ip))
            }
            _ => Err(auth_stat::AUTH_BADCRED),
        };
        match &result {
            Ok(ctx) => {
                self.audit(ctx, "AUTH", Path::new("-"), true, &format!("{:?}", cred.flavor));
            }
            Err(stat) => {
                let anon = SecurityContext::anonymous(
                    client_ip,
                    self.config.anon_uid,
                    self.config.anon_gid,
                );
                self.audit(&anon, "AUTH", Path::new("-"), false, &format!("{stat:?}"));
            }
        }
        result
    }

    fn context_from_sys(
        &self,
        parms: auth_sys_parms,
        client_ip: IpAddr,
    ) -> Result<SecurityContext, auth_stat> {
        if parms.gids.len() > crate::protocol::xdr::rpc::AUTH_SYS_MAX_GIDS {
            warn!("AUTH_SYS with {} gids refused", parms.gids.len());
            return Err(auth_stat::AUTH_BADCRED);
        }
        if parms.machinename.len() > MAX_MACHINE_NAME {
            return Err(auth_stat::AUTH_BADCRED);
        }
        let machine = String::from_utf8(parms.machinename.clone())
            .map_err(|_| auth_stat::AUTH_BADCRED)?;

        self.check_stamp(&machine, parms.stamp)?;

        let mut uid = parms.uid;
        let mut gid = parms.gid;
        let mut gids = parms.gids.clone();
        let squash = self.config.root_squash
            && (uid == 0 || gid == 0)
            && !self.config.client_is_root_trusted(client_ip);
        if squash {
            debug!(%client_ip, "squashing root credentials");
            if uid == 0 {
                uid = self.config.anon_uid;
            }
            if gid == 0 {
                gid = self.config.anon_gid;
            }
            gids.retain(|g| *g != 0);
        }

        Ok(SecurityContext {
            authenticated: true,
            uid,
            gid,
            gids,
            machine,
            client_ip,
            auth_flavor: auth_flavor::AUTH_SYS,
            session_id: None,
            auth_time: SystemTime::now(),
        })
    }

    fn check_stamp(&self, machine: &str, stamp: u32) -> Result<(), auth_stat> {
        if machine.is_empty() {
            return Ok(());
        }
        let mut stamps = self.stamps.lock().expect("stamp table poisoned");
        let now = SystemTime::now();
        if let Some((last_stamp, last_seen)) = stamps.get(machine) {
            let recent = now
                .duration_since(*last_seen)
                .map(|d| d < STAMP_WINDOW)
                .unwrap_or(true);
            if recent && stamp.saturating_add(STAMP_DRIFT) < *last_stamp {
                warn!(machine, stamp, last_stamp, "stamp regression refused");
                return Err(auth_stat::AUTH_REJECTEDCRED);
            }
        }
        let entry = stamps.entry(machine.to_string()).or_insert((stamp, now));
        entry.0 = entry.0.max(stamp);
        entry.1 = now;
        Ok(())
    }

    /// Promotes a context to a security session, returning its token.
    pub fn create_session(&self, ctx: &SecurityContext) -> [u8; 16] {
        let mut id = [0_u8; 16];
        rand::thread_rng().fill_bytes(&mut id);
        let now = SystemTime::now();
        self.sessions.lock().expect("session table poisoned").insert(
            id,
            SecuritySession { ctx: ctx.clone(), created: now, last_seen: now },
        );
        id
    }

    /// Refreshes and returns the context of a live session.
    pub fn validate_session(&self, id: &[u8; 16]) -> Option<SecurityContext> {
        let mut sessions = self.sessions.lock().expect("session table poisoned");
        let session = sessions.get_mut(id)?;
        session.last_seen = SystemTime::now();
        Some(session.ctx.clone())
    }

    pub fn destroy_session(&self, id: &[u8; 16]) -> bool {
        self.sessions.lock().expect("session table poisoned").remove(id).is_some()
    }

    /// Drops sessions idle past the configured timeout; returns the
    /// number removed. Called from the background sweeper.
    pub fn sweep_sessions(&self) -> usize {
        let timeout = self.config.session_timeout;
        let now = SystemTime::now();
        let mut sessions = self.sessions.lock().expect("session table poisoned");
        let before = sessions.len();
        sessions.retain(|_, s| {
            now.duration_since(s.last_seen).map(|idle| idle < timeout).unwrap_or(true)
        });
        before - sessions.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().expect("session table poisoned").len()
    }

    /// Lexically canonicalizes `path` and confirms it stays below the
    /// export root. `..` components are rejected outright.
    pub fn contain_path(&self, path: &Path) -> Option<PathBuf> {
        let root = &self.config.root_path;
        let mut out = PathBuf::new();
        for component in path.components() {
            match component {
                Component::ParentDir => return None,
                Component::CurDir => {}
                other => out.push(other),
            }
        }
        if out.starts_with(root) {
            Some(out)
        } else {
            None
        }
    }

    /// Authorization decision for `perms` on `path`, using the file's
    /// ACL when one is present and UNIX mode bits otherwise.
    pub fn check_access(
        &self,
        ctx: &SecurityContext,
        path: &Path,
        perms: u8,
        stat: &FileStat,
    ) -> bool {
        if self.contain_path(path).is_none() {
            return false;
        }
        if !ctx.authenticated && !self.config.anonymous_access {
            // AUTH_NONE may browse nothing beyond what the dispatcher
            // already allows (NULL and service discovery).
            return false;
        }

        if self.config.enable_acl {
            let acls = self.acls.lock().expect("acl table poisoned");
            if let Some(acl) = acls.get(path) {
                return acl.evaluate(ctx, stat.uid, stat.gid, perms);
            }
        }

        if ctx.uid == 0 {
            return true;
        }
        let triple = if ctx.uid == stat.uid {
            (stat.mode >> 6) & 7
        } else if ctx.in_group(stat.gid) {
            (stat.mode >> 3) & 7
        } else {
            stat.mode & 7
        };
        triple & perms as u32 == perms as u32
    }

    pub fn get_acl(&self, path: &Path) -> Option<FileAcl> {
        self.acls.lock().expect("acl table poisoned").get(path).cloned()
    }

    /// Installs an ACL, persisting the store when configured.
    pub fn set_acl(&self, path: &Path, acl: FileAcl) -> bool {
        if !acl.is_well_formed() {
            return false;
        }
        self.acls.lock().expect("acl table poisoned").insert(path.to_path_buf(), acl);
        self.persist_acls();
        true
    }

    pub fn remove_acl(&self, path: &Path) {
        self.acls.lock().expect("acl table poisoned").remove(path);
        self.persist_acls();
    }

    fn persist_acls(&self) {
        let Some(store) = self.config.acl_store_path.clone() else {
            return;
        };
        if let Err(err) = self.save_acl_store(&store) {
            warn!(?store, ?err, "failed to persist ACL store");
        }
    }

    fn load_acl_store(&self, path: &Path) -> anyhow::Result<()> {
        let raw = std::fs::read(path).with_context(|| format!("reading ACL store {path:?}"))?;
        let mut cursor = Cursor::new(raw);
        let count = deserialize::<u32>(&mut cursor).context("ACL store header")?;
        let mut acls = self.acls.lock().expect("acl table poisoned");
        for _ in 0..count {
            let key = deserialize::<String>(&mut cursor).context("ACL store key")?;
            let acl = deserialize::<FileAcl>(&mut cursor).context("ACL store entry")?;
            if !acl.is_well_formed() {
                anyhow::bail!("ACL store entry for {key:?} is malformed");
            }
            acls.insert(PathBuf::from(key), acl);
        }
        info!(count, "loaded ACL store");
        Ok(())
    }

    fn save_acl_store(&self, path: &Path) -> anyhow::Result<()> {
        let acls = self.acls.lock().expect("acl table poisoned");
        let mut out = Vec::new();
        (acls.len() as u32).serialize(&mut out)?;
        for (key, acl) in acls.iter() {
            key.to_string_lossy().into_owned().serialize(&mut out)?;
            acl.serialize(&mut out)?;
        }
        drop(acls);
        std::fs::write(path, out).with_context(|| format!("writing ACL store {path:?}"))
    }

    /// Appends an audit entry; failures are logged but never fail the
    /// request that produced them.
    pub fn audit(&self, ctx: &SecurityContext, operation: &str, path: &Path, success: bool,
                 detail: &str) {
        let entry = AuditEntry {
            timestamp: SystemTime::now(),
            client: ctx.client_ip.to_string(),
            uid: ctx.uid,
            operation: operation.to_string(),
            path: path.to_string_lossy().into_owned(),
            success,
            detail: detail.to_string(),
        };
        if let Err(err) = self.audit.lock().expect("audit sink poisoned").append(&entry) {
            warn!(?err, "audit append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Arc<Config> {
        Arc::new(Config { root_path: PathBuf::from("/export"), ..Config::default() })
    }

    fn manager() -> SecurityManager {
        SecurityManager::new(test_config()).unwrap()
    }

    fn ctx(uid: u32, gid: u32) -> SecurityContext {
        SecurityContext {
            authenticated: true,
            uid,
            gid,
            gids: vec![gid],
            machine: "client".into(),
            client_ip: "127.0.0.1".parse().unwrap(),
            auth_flavor: auth_flavor::AUTH_SYS,
            session_id: None,
            auth_time: SystemTime::now(),
        }
    }

    fn stat(uid: u32, gid: u32, mode: u32) -> FileStat {
        FileStat { uid, gid, mode, ..FileStat::default() }
    }

    #[test]
    fn owner_entry_wins_over_later_entries() {
        let acl = FileAcl {
            entries: vec![
                AclEntry { kind: AclKind::User, id: 1000, permissions: 7, name: None },
                AclEntry { kind: AclKind::User, id: 1000, permissions: 0, name: None },
                AclEntry { kind: AclKind::Other, id: 0, permissions: 0, name: None },
            ],
            default_mask: 7,
            is_directory: false,
        };
        // Owner ACE grants even though a later entry would deny.
        assert!(acl.evaluate(&ctx(1000, 100), 1000, 100, PERM_READ | PERM_WRITE));
    }

    #[test]
    fn first_match_stops_the_search() {
        let acl = FileAcl {
            entries: vec![
                AclEntry { kind: AclKind::User, id: 2000, permissions: 0, name: None },
                AclEntry { kind: AclKind::Other, id: 0, permissions: 7, name: None },
            ],
            default_mask: 7,
            is_directory: false,
        };
        // uid 2000 matches the named-user deny; the permissive Other
        // entry must not be consulted.
        assert!(!acl.evaluate(&ctx(2000, 100), 1000, 100, PERM_READ));
        // An unrelated uid falls through to Other.
        assert!(acl.evaluate(&ctx(3000, 100), 1000, 100, PERM_READ));
    }

    #[test]
    fn acl_enforcement_matrix() {
        let acl = FileAcl {
            entries: vec![
                AclEntry { kind: AclKind::User, id: 1000, permissions: 7, name: None },
                AclEntry { kind: AclKind::Other, id: 0, permissions: PERM_READ as u32, name: None },
            ],
            default_mask: 7,
            is_directory: false,
        };
        assert!(acl.evaluate(&ctx(1000, 1), 1000, 1, PERM_WRITE));
        assert!(!acl.evaluate(&ctx(2000, 1), 1000, 1, PERM_WRITE));
        assert!(acl.evaluate(&ctx(2000, 1), 1000, 1, PERM_READ));
    }

    #[test]
    fn mode_bits_fall_back_when_no_acl() {
        let m = manager();
        let path = Path::new("/export/f");
        assert!(m.check_access(&ctx(1000, 100), path, PERM_READ | PERM_WRITE,
                               &stat(1000, 100, 0o640)));
        assert!(!m.check_access(&ctx(2000, 100), path, PERM_WRITE, &stat(1000, 100, 0o640)));
        assert!(m.check_access(&ctx(2000, 100), path, PERM_READ, &stat(1000, 100, 0o640)));
        assert!(!m.check_access(&ctx(2000, 200), path, PERM_READ, &stat(1000, 100, 0o640)));
    }

    #[test]
    fn containment_rejects_escapes() {
        let m = manager();
        assert!(m.contain_path(Path::new("/export/a/b")).is_some());
        assert!(m.contain_path(Path::new("/export/a/../../etc/passwd")).is_none());
        assert!(m.contain_path(Path::new("/etc/passwd")).is_none());
    }

    #[test]
    fn component_validation() {
        let dir = Path::new("/export/d");
        assert_eq!(join_component(dir, b".."), Err(NameError::Traversal));
        assert_eq!(join_component(dir, b"a/b"), Err(NameError::Traversal));
        assert_eq!(join_component(dir, b""), Err(NameError::Empty));
        assert_eq!(join_component(dir, b".").unwrap(), dir);
        assert_eq!(join_component(dir, b"ok").unwrap(), dir.join("ok"));
    }

    #[test]
    fn auth_sys_limits() {
        let m = manager();
        let parms = auth_sys_parms {
            stamp: 1,
            machinename: b"host".to_vec(),
            uid: 500,
            gid: 500,
            gids: (0..17).collect(),
        };
        assert_eq!(m.context_from_sys(parms, "10.0.0.1".parse().unwrap()),
                   Err(auth_stat::AUTH_BADCRED));

        let parms = auth_sys_parms {
            stamp: 1,
            machinename: vec![0xff, 0xfe],
            uid: 500,
            gid: 500,
            gids: vec![],
        };
        assert_eq!(m.context_from_sys(parms, "10.0.0.1".parse().unwrap()),
                   Err(auth_stat::AUTH_BADCRED));
    }

    #[test]
    fn stamp_regression_is_refused() {
        let m = manager();
        assert!(m.check_stamp("host", 10_000).is_ok());
        // Small regression within drift tolerance is fine.
        assert!(m.check_stamp("host", 9_900).is_ok());
        // A large regression inside the window is a replay.
        assert_eq!(m.check_stamp("host", 9_000), Err(auth_stat::AUTH_REJECTEDCRED));
    }

    #[test]
    fn root_squash_applies() {
        let m = manager();
        let parms = auth_sys_parms {
            stamp: 1,
            machinename: b"host".to_vec(),
            uid: 0,
            gid: 0,
            gids: vec![0, 7],
        };
        let ctx = m.context_from_sys(parms, "10.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(ctx.uid, 65534);
        assert_eq!(ctx.gid, 65534);
        assert_eq!(ctx.gids, vec![7]);
    }

    #[test]
    fn sessions_expire() {
        let config = Arc::new(Config {
            root_path: PathBuf::from("/export"),
            session_timeout: Duration::from_secs(0),
            ..Config::default()
        });
        let m = SecurityManager::new(config).unwrap();
        let id = m.create_session(&ctx(1, 1));
        assert!(m.validate_session(&id).is_some());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(m.sweep_sessions(), 1);
        assert!(m.validate_session(&id).is_none());
    }

    #[test]
    fn acl_round_trips_through_codec() {
        let acl = FileAcl {
            entries: vec![
                AclEntry { kind: AclKind::User, id: 1000, permissions: 6,
                           name: Some("alice".into()) },
                AclEntry { kind: AclKind::Other, id: 0, permissions: 4, name: None },
            ],
            default_mask: 6,
            is_directory: true,
        };
        let mut buf = Vec::new();
        acl.serialize(&mut buf).unwrap();
        let decoded = deserialize::<FileAcl>(&mut Cursor::new(buf)).unwrap();
        assert_eq!(acl, decoded);
    }
}
