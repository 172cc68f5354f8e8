//! Virtual File System seam between the protocol engine and storage.
//!
//! The protocol layers never touch the operating system directly: every
//! file operation goes through [`VfsBackend`], keyed by canonical paths
//! that have already passed handle resolution and the security manager's
//! containment checks. Implementations may mirror a local directory,
//! serve synthesized content, or anything else that can satisfy the
//! trait.
//!
//! Errors cross this seam as the protocol-neutral [`VfsError`]; each NFS
//! version maps them onto its own status codes. I/O failures are never
//! retried here — the NFS client owns retry policy.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Protocol-neutral failure of a VFS operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VfsError {
    /// The path does not exist.
    NotFound,
    /// Permission denied by the backing store.
    Access,
    /// Caller is not the owner and the operation requires ownership.
    Perm,
    /// Target already exists.
    Exists,
    /// A directory operation named a non-directory.
    NotDir,
    /// A file operation named a directory.
    IsDir,
    /// Directory not empty.
    NotEmpty,
    /// Name component too long.
    NameTooLong,
    /// Storage exhausted.
    NoSpace,
    /// Quota exhausted.
    Quota,
    /// Backend is read-only.
    ReadOnly,
    /// The operation would exceed the maximum file size.
    TooBig,
    /// Argument outside the backend's supported range.
    Invalid,
    /// Operation not supported by this backend.
    NotSupported,
    /// Backend is temporarily unable to serve the request.
    Delay,
    /// Any other I/O failure.
    Io,
}

pub type VfsResult<T> = Result<T, VfsError>;

impl From<std::io::Error> for VfsError {
    fn from(err: std::io::Error) -> VfsError {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => VfsError::NotFound,
            ErrorKind::PermissionDenied => VfsError::Access,
            ErrorKind::AlreadyExists => VfsError::Exists,
            ErrorKind::DirectoryNotEmpty => VfsError::NotEmpty,
            ErrorKind::NotADirectory => VfsError::NotDir,
            ErrorKind::IsADirectory => VfsError::IsDir,
            ErrorKind::StorageFull => VfsError::NoSpace,
            ErrorKind::ReadOnlyFilesystem => VfsError::ReadOnly,
            ErrorKind::InvalidFilename => VfsError::NameTooLong,
            ErrorKind::Unsupported => VfsError::NotSupported,
            _ => VfsError::Io,
        }
    }
}

/// File object kinds the protocols can express.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FileKind {
    #[default]
    Regular,
    Directory,
    Symlink,
    Block,
    Char,
    Socket,
    Fifo,
}

/// Second/nanosecond timestamp.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn now() -> Timestamp {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp { seconds: now.as_secs() as i64, nanos: now.subsec_nanos() }
    }
}

/// Complete attributes of a file object.
#[derive(Copy, Clone, Debug, Default)]
pub struct FileStat {
    pub kind: FileKind,
    /// Permission bits (the low 12 mode bits).
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// Bytes actually allocated.
    pub used: u64,
    /// Major/minor numbers for device nodes.
    pub rdev: (u32, u32),
    pub fsid: u64,
    /// Stable object identifier (inode number). Zero is reserved.
    pub fileid: u64,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
}

impl FileStat {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// Attribute changes requested by SETATTR-style operations.
#[derive(Copy, Clone, Debug, Default)]
pub struct SetAttrs {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<SetTime>,
    pub mtime: Option<SetTime>,
}

/// Requested source of a new timestamp.
#[derive(Copy, Clone, Debug)]
pub enum SetTime {
    ServerTime,
    ClientTime(Timestamp),
}

/// One directory entry with its attributes.
#[derive(Clone, Debug)]
pub struct VfsDirEntry {
    pub name: Vec<u8>,
    pub stat: FileStat,
}

/// Aggregate file system statistics.
#[derive(Copy, Clone, Debug)]
pub struct FsStat {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub avail_bytes: u64,
    pub total_files: u64,
    pub free_files: u64,
}

impl Default for FsStat {
    fn default() -> FsStat {
        FsStat {
            total_bytes: 1 << 40,
            free_bytes: 1 << 39,
            avail_bytes: 1 << 39,
            total_files: 1 << 20,
            free_files: 1 << 19,
        }
    }
}

/// Storage capability consumed by the protocol engine.
///
/// Paths are always canonical and inside the export root by the time
/// they reach the backend. `stat` is on every request path and should be
/// cheap. The advisory `lock` hook exists for backends that can push
/// byte-range locks down to their storage; the protocol engine keeps its
/// own lock table regardless.
#[async_trait]
pub trait VfsBackend: Send + Sync {
    async fn stat(&self, path: &Path) -> VfsResult<FileStat>;

    async fn setattr(&self, path: &Path, attrs: &SetAttrs) -> VfsResult<FileStat>;

    /// Reads up to `count` bytes at `offset`; the bool reports EOF.
    async fn read(&self, path: &Path, offset: u64, count: u32) -> VfsResult<(Vec<u8>, bool)>;

    /// Writes `data` at `offset`, extending the file as needed. When
    /// `sync` is set the data must reach stable storage before return.
    async fn write(&self, path: &Path, offset: u64, data: &[u8], sync: bool)
        -> VfsResult<FileStat>;

    /// Creates a regular file. With `exclusive`, an existing file fails
    /// with [`VfsError::Exists`].
    async fn create(&self, path: &Path, mode: u32, exclusive: bool) -> VfsResult<FileStat>;

    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileStat>;

    async fn remove(&self, path: &Path) -> VfsResult<()>;

    async fn rmdir(&self, path: &Path) -> VfsResult<()>;

    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()>;

    async fn link(&self, existing: &Path, link: &Path) -> VfsResult<FileStat>;

    async fn symlink(&self, target: &[u8], link: &Path) -> VfsResult<FileStat>;

    async fn readlink(&self, path: &Path) -> VfsResult<Vec<u8>>;

    /// Returns all entries of a directory, excluding `.` and `..`, in a
    /// stable order. The protocol layer handles cookie pagination.
    async fn readdir(&self, path: &Path) -> VfsResult<Vec<VfsDirEntry>>;

    async fn mknod(
        &self,
        _path: &Path,
        _kind: FileKind,
        _rdev: (u32, u32),
        _mode: u32,
    ) -> VfsResult<FileStat> {
        Err(VfsError::NotSupported)
    }

    /// Flushes previously unstable writes to stable storage.
    async fn commit(&self, _path: &Path) -> VfsResult<()> {
        Ok(())
    }

    async fn fsstat(&self, _path: &Path) -> VfsResult<FsStat> {
        Ok(FsStat::default())
    }

    async fn get_xattr(&self, _path: &Path, _name: &str) -> VfsResult<Vec<u8>> {
        Err(VfsError::NotSupported)
    }

    async fn set_xattr(&self, _path: &Path, _name: &str, _value: &[u8]) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    /// Advisory byte-range lock pass-through.
    async fn lock(&self, _path: &Path, _offset: u64, _length: u64, _exclusive: bool)
        -> VfsResult<()> {
        Ok(())
    }

    /// Root of the namespace served by this backend.
    fn root_path(&self) -> PathBuf;
}
