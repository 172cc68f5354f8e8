//! nfs-taiga - a user-space ONC-RPC / NFS file server in Rust.
//!
//! The crate serves the Network File System protocol versions 2, 3 and
//! 4 over TCP and UDP, together with the PORTMAP and MOUNT discovery
//! programs, against any storage that implements the [`vfs::VfsBackend`]
//! trait.
//!
//! ## Main components
//!
//! - `protocol::xdr`: External Data Representation codec (RFC 4506) and
//!   the wire types of every served program.
//! - `protocol::rpc`: ONC-RPC v2 dispatch (RFC 5531), record framing on
//!   TCP, authentication and the per-call context.
//! - `protocol::nfs`: the program handlers: NFSv2 (RFC 1094), NFSv3
//!   (RFC 1813), the NFSv4 COMPOUND engine with sessions (RFC 7530 /
//!   RFC 5661), PORTMAP (RFC 1833) and MOUNT.
//! - `handle`: the bounded table mapping opaque file handles to
//!   canonical paths.
//! - `security`: AUTH_SYS validation, security sessions, ACL storage
//!   and evaluation, path containment and the audit trail.
//! - `access`: per-file share-mode tracking with conflict detection.
//! - `state`: NFSv4 client ids, sessions with slot replay caches, open
//!   and lock state.
//! - `server`: the TCP/UDP listeners binding everything together.
//!
//! The command line launcher, configuration file parsing, daemonization
//! and signal handling live outside this crate; the server consumes a
//! ready [`config::Config`] value and a [`vfs::VfsBackend`]
//! implementation.

pub mod access;
pub mod config;
pub mod handle;
pub mod protocol;
pub mod security;
pub mod server;
pub mod state;
pub mod vfs;

pub use protocol::xdr;
pub use server::NfsServer;
