//! Per-file share-mode tracker.
//!
//! NFSv4 OPEN and the first v2/v3 READ/WRITE on a file insert an access
//! record keyed by `(path, owner)`. New requests are checked against the
//! sharing compatibility matrix; a conflicting request is refused with
//! `NFS4ERR_SHARE_DENIED` (v4) or `NFSERR_ACCES` (v2/v3). Records expire
//! after a period of inactivity and are reaped by the background sweep.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// How the holder intends to use the file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
    Append,
}

impl AccessMode {
    pub fn reads(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    pub fn writes(self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }
}

/// What the holder allows others to do concurrently.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SharingMode {
    Exclusive,
    SharedRead,
    SharedWrite,
    SharedAll,
}

/// One live access record.
#[derive(Clone, Debug)]
pub struct AccessRecord {
    pub owner: Vec<u8>,
    pub mode: AccessMode,
    pub sharing: SharingMode,
    pub expires_at: SystemTime,
}

/// Compatibility of a new request against one existing record.
///
/// `deny-write` cells refuse the newcomer only when it would write,
/// `deny-read` cells only when it would read.
fn compatible(existing: SharingMode, new_sharing: SharingMode, new_mode: AccessMode) -> bool {
    use SharingMode::*;
    match (existing, new_sharing) {
        (Exclusive, _) => false,
        (_, Exclusive) => false,
        (SharedRead, SharedRead) => true,
        (SharedRead, SharedWrite) | (SharedRead, SharedAll) => !new_mode.writes(),
        (SharedWrite, SharedWrite) => true,
        (SharedWrite, SharedRead) | (SharedWrite, SharedAll) => !new_mode.reads(),
        (SharedAll, _) => true,
    }
}

/// Shared tracker over all files.
pub struct AccessTracker {
    records: Mutex<HashMap<PathBuf, Vec<AccessRecord>>>,
    timeout: Duration,
}

impl AccessTracker {
    pub fn new(timeout: Duration) -> AccessTracker {
        AccessTracker { records: Mutex::new(HashMap::new()), timeout }
    }

    /// Registers `owner`'s access to `path`, refusing conflicting
    /// share modes. Re-acquiring with the same owner refreshes and
    /// replaces the existing record.
    pub fn acquire(
        &self,
        path: &Path,
        owner: &[u8],
        mode: AccessMode,
        sharing: SharingMode,
    ) -> Result<(), ()> {
        let now = SystemTime::now();
        let mut records = self.records.lock().expect("access tracker poisoned");
        let entries = records.entry(path.to_path_buf()).or_default();
        entries.retain(|r| r.expires_at > now);

        for record in entries.iter() {
            if record.owner == owner {
                continue;
            }
            if !compatible(record.sharing, sharing, mode) {
                return Err(());
            }
        }

        let expires_at = now + self.timeout;
        match entries.iter_mut().find(|r| r.owner == owner) {
            Some(existing) => {
                existing.mode = mode;
                existing.sharing = sharing;
                existing.expires_at = expires_at;
            }
            None => entries.push(AccessRecord {
                owner: owner.to_vec(),
                mode,
                sharing,
                expires_at,
            }),
        }
        Ok(())
    }

    /// Refreshes the expiry of an existing record.
    pub fn touch(&self, path: &Path, owner: &[u8]) {
        let mut records = self.records.lock().expect("access tracker poisoned");
        if let Some(entries) = records.get_mut(path) {
            let expires_at = SystemTime::now() + self.timeout;
            if let Some(record) = entries.iter_mut().find(|r| r.owner == owner) {
                record.expires_at = expires_at;
            }
        }
    }

    /// Drops `owner`'s record on `path`.
    pub fn release(&self, path: &Path, owner: &[u8]) {
        let mut records = self.records.lock().expect("access tracker poisoned");
        if let Some(entries) = records.get_mut(path) {
            entries.retain(|r| r.owner != owner);
            if entries.is_empty() {
                records.remove(path);
            }
        }
    }

    /// Drops every record on `path` (unlink, rename).
    pub fn release_path(&self, path: &Path) {
        self.records.lock().expect("access tracker poisoned").remove(path);
    }

    /// Removes expired records; returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = SystemTime::now();
        let mut records = self.records.lock().expect("access tracker poisoned");
        let mut dropped = 0;
        records.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|r| r.expires_at > now);
            dropped += before - entries.len();
            !entries.is_empty()
        });
        dropped
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("access tracker poisoned").values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> AccessTracker {
        AccessTracker::new(Duration::from_secs(60))
    }

    #[test]
    fn exclusive_blocks_everything() {
        let t = tracker();
        let path = Path::new("/f");
        t.acquire(path, b"a", AccessMode::ReadWrite, SharingMode::Exclusive).unwrap();
        for sharing in [
            SharingMode::Exclusive,
            SharingMode::SharedRead,
            SharingMode::SharedWrite,
            SharingMode::SharedAll,
        ] {
            assert!(t.acquire(path, b"b", AccessMode::ReadOnly, sharing).is_err());
        }
    }

    #[test]
    fn exclusive_newcomer_is_blocked_by_any_record() {
        let t = tracker();
        let path = Path::new("/f");
        t.acquire(path, b"a", AccessMode::ReadOnly, SharingMode::SharedAll).unwrap();
        assert!(t.acquire(path, b"b", AccessMode::ReadWrite, SharingMode::Exclusive).is_err());
    }

    #[test]
    fn shared_read_matrix() {
        let t = tracker();
        let path = Path::new("/f");
        t.acquire(path, b"a", AccessMode::ReadOnly, SharingMode::SharedRead).unwrap();
        assert!(t.acquire(path, b"b", AccessMode::ReadOnly, SharingMode::SharedRead).is_ok());
        // deny-write: a writing newcomer is refused.
        assert!(t
            .acquire(path, b"c", AccessMode::WriteOnly, SharingMode::SharedWrite)
            .is_err());
        assert!(t.acquire(path, b"d", AccessMode::ReadOnly, SharingMode::SharedAll).is_ok());
    }

    #[test]
    fn shared_write_matrix() {
        let t = tracker();
        let path = Path::new("/f");
        t.acquire(path, b"a", AccessMode::WriteOnly, SharingMode::SharedWrite).unwrap();
        assert!(t.acquire(path, b"b", AccessMode::WriteOnly, SharingMode::SharedWrite).is_ok());
        // deny-read: a reading newcomer is refused.
        assert!(t.acquire(path, b"c", AccessMode::ReadOnly, SharingMode::SharedRead).is_err());
        assert!(t.acquire(path, b"d", AccessMode::WriteOnly, SharingMode::SharedAll).is_ok());
    }

    #[test]
    fn shared_all_admits_shared_modes() {
        let t = tracker();
        let path = Path::new("/f");
        t.acquire(path, b"a", AccessMode::ReadWrite, SharingMode::SharedAll).unwrap();
        assert!(t.acquire(path, b"b", AccessMode::ReadOnly, SharingMode::SharedRead).is_ok());
        assert!(t.acquire(path, b"c", AccessMode::WriteOnly, SharingMode::SharedWrite).is_ok());
        assert!(t.acquire(path, b"d", AccessMode::ReadWrite, SharingMode::SharedAll).is_ok());
    }

    #[test]
    fn same_owner_reacquires() {
        let t = tracker();
        let path = Path::new("/f");
        t.acquire(path, b"a", AccessMode::ReadWrite, SharingMode::Exclusive).unwrap();
        assert!(t.acquire(path, b"a", AccessMode::ReadOnly, SharingMode::SharedRead).is_ok());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn release_and_sweep_return_to_steady_state() {
        let t = AccessTracker::new(Duration::from_millis(1));
        let path = Path::new("/f");
        t.acquire(path, b"a", AccessMode::ReadOnly, SharingMode::SharedRead).unwrap();
        t.acquire(path, b"b", AccessMode::ReadOnly, SharingMode::SharedRead).unwrap();
        t.release(path, b"a");
        assert_eq!(t.len(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(t.sweep(), 1);
        assert!(t.is_empty());
    }
}
