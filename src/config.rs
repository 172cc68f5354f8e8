//! Server configuration.
//!
//! The textual configuration formats and the command line are handled by
//! the launcher; the core consumes a fully-formed [`Config`] value at
//! startup. Defaults follow the conventional NFS deployment: port 2049,
//! both transports, all three protocol versions, AUTH_SYS with root
//! squashing.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context as _};

/// A single exported directory and the clients allowed to reach it.
#[derive(Clone, Debug)]
pub struct ExportEntry {
    /// Name clients use to mount the export.
    pub name: String,
    /// Directory backing the export; must lie below `Config::root_path`.
    pub path: PathBuf,
    /// Client patterns: `*`, an exact address, or `addr/prefixlen`.
    pub clients: Vec<String>,
    /// Export options (`ro`, `rw`, `no_root_squash`, ...).
    pub options: Vec<String>,
    /// Free-form operator comment.
    pub comment: String,
}

impl ExportEntry {
    /// Whether `addr` matches one of the export's client patterns.
    pub fn matches_client(&self, addr: IpAddr) -> bool {
        self.clients.iter().any(|spec| client_spec_matches(spec, addr))
    }

    /// Whether the export disables root squashing for matching clients.
    pub fn no_root_squash(&self) -> bool {
        self.options.iter().any(|o| o == "no_root_squash")
    }
}

fn client_spec_matches(spec: &str, addr: IpAddr) -> bool {
    if spec == "*" {
        return true;
    }
    if let Some((base, len)) = spec.split_once('/') {
        let (Ok(base), Ok(len)) = (base.parse::<IpAddr>(), len.parse::<u32>()) else {
            return false;
        };
        return prefix_matches(base, addr, len);
    }
    spec.parse::<IpAddr>().map(|s| s == addr).unwrap_or(false)
}

fn prefix_matches(base: IpAddr, addr: IpAddr, len: u32) -> bool {
    match (base, addr) {
        (IpAddr::V4(b), IpAddr::V4(a)) => {
            let len = len.min(32);
            let mask = if len == 0 { 0 } else { u32::MAX << (32 - len) };
            u32::from(b) & mask == u32::from(a) & mask
        }
        (IpAddr::V6(b), IpAddr::V6(a)) => {
            let len = len.min(128);
            let mask = if len == 0 { 0 } else { u128::MAX << (128 - len) };
            u128::from(b) & mask == u128::from(a) & mask
        }
        _ => false,
    }
}

/// Complete server configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: IpAddr,
    pub port: u16,
    pub max_connections: usize,
    pub enable_tcp: bool,
    pub enable_udp: bool,
    /// Root of the exported namespace; every resolved path must stay
    /// below this directory.
    pub root_path: PathBuf,
    pub enable_nfsv2: bool,
    pub enable_nfsv3: bool,
    pub enable_nfsv4: bool,
    pub thread_pool_size: usize,
    /// Largest accepted RPC record; larger records drop the connection.
    pub max_request_size: usize,
    /// Bound on the file handle table.
    pub cache_size: usize,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub audit_log_file: Option<PathBuf>,
    pub enable_auth_sys: bool,
    pub enable_auth_dh: bool,
    pub enable_kerberos: bool,
    pub enable_acl: bool,
    /// Map uid/gid 0 to the anonymous identity unless the client is
    /// covered by a `no_root_squash` export.
    pub root_squash: bool,
    pub anonymous_access: bool,
    pub anon_uid: u32,
    pub anon_gid: u32,
    pub session_timeout: Duration,
    pub file_access_timeout: Duration,
    pub cleanup_interval: Duration,
    /// Bound on the portmap registry.
    pub portmap_max_mappings: usize,
    /// Age limit for portmap registrations; disabled when `None`.
    pub portmap_mapping_timeout: Option<Duration>,
    /// Optional persisted ACL store.
    pub acl_store_path: Option<PathBuf>,
    pub exports: Vec<ExportEntry>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: 2049,
            max_connections: 64,
            enable_tcp: true,
            enable_udp: true,
            root_path: PathBuf::from("/srv/nfs"),
            enable_nfsv2: true,
            enable_nfsv3: true,
            enable_nfsv4: true,
            thread_pool_size: 4,
            max_request_size: 1024 * 1024,
            cache_size: 1000,
            log_level: "info".to_string(),
            log_file: None,
            audit_log_file: None,
            enable_auth_sys: true,
            enable_auth_dh: false,
            enable_kerberos: false,
            enable_acl: true,
            root_squash: true,
            anonymous_access: false,
            anon_uid: 65534,
            anon_gid: 65534,
            session_timeout: Duration::from_secs(3600),
            file_access_timeout: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(60),
            portmap_max_mappings: 256,
            portmap_mapping_timeout: None,
            acl_store_path: None,
            exports: Vec::new(),
        }
    }
}

impl Config {
    /// Checks internal consistency before the server starts.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.enable_nfsv2 || self.enable_nfsv3 || self.enable_nfsv4) {
            bail!("no NFS protocol version enabled");
        }
        if !(self.enable_tcp || self.enable_udp) {
            bail!("no transport enabled");
        }
        if self.max_request_size < 512 {
            bail!("max_request_size {} is below the RPC header minimum", self.max_request_size);
        }
        if !self.root_path.is_absolute() {
            bail!("root_path {:?} must be absolute", self.root_path);
        }
        for export in &self.exports {
            let path = export
                .path
                .canonicalize()
                .with_context(|| format!("export {:?} path {:?}", export.name, export.path))?;
            if !path.starts_with(&self.root_path) {
                bail!("export {:?} escapes root_path {:?}", export.name, self.root_path);
            }
        }
        Ok(())
    }

    /// Exports matching the given client address, most specific first
    /// left to the operator's ordering.
    pub fn exports_for(&self, addr: IpAddr) -> impl Iterator<Item = &ExportEntry> {
        self.exports.iter().filter(move |e| e.matches_client(addr))
    }

    /// Whether the client is trusted to keep uid 0 on some export.
    pub fn client_is_root_trusted(&self, addr: IpAddr) -> bool {
        self.exports.iter().any(|e| e.no_root_squash() && e.matches_client(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_patterns() {
        let export = ExportEntry {
            name: "data".into(),
            path: PathBuf::from("/srv/nfs/data"),
            clients: vec!["10.0.0.0/8".into(), "192.168.1.7".into()],
            options: vec!["rw".into()],
            comment: String::new(),
        };
        assert!(export.matches_client("10.200.3.4".parse().unwrap()));
        assert!(export.matches_client("192.168.1.7".parse().unwrap()));
        assert!(!export.matches_client("192.168.1.8".parse().unwrap()));
    }

    #[test]
    fn wildcard_matches_everything() {
        let export = ExportEntry {
            name: "pub".into(),
            path: PathBuf::from("/srv/nfs/pub"),
            clients: vec!["*".into()],
            options: vec![],
            comment: String::new(),
        };
        assert!(export.matches_client("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn validate_requires_a_version_and_transport() {
        let mut config = Config { enable_nfsv2: false, enable_nfsv3: false, ..Config::default() };
        config.enable_nfsv4 = false;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.enable_tcp = false;
        config.enable_udp = false;
        assert!(config.validate().is_err());
    }
}
