//! File handle table: the bidirectional mapping between opaque wire
//! handles and canonical paths.
//!
//! A handle encodes a table row id plus the server's boot generation.
//! Row ids are allocated monotonically and never reused, so handles
//! never collide across the server lifetime; a handle from an earlier
//! boot fails the generation check and is reported stale. Each row
//! remembers the fileid observed when the handle was minted — if the
//! path later resolves to a different object (rename or unlink put
//! something else there) the handle is invalidated and the caller sees
//! `NFSERR_STALE`.
//!
//! The table is bounded: once `capacity` is exceeded the least recently
//! used rows are evicted, skipping rows pinned by NFSv4 open state or
//! delegations and the export root itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// Row id of the export root, allocated first at startup.
pub const ROOT_HANDLE_ID: u64 = 1;

/// Length of the core handle encoding (row id + generation).
pub const HANDLE_CORE_LEN: usize = 16;
/// Length of a fixed NFSv2 handle.
pub const HANDLE_V2_LEN: usize = 32;

/// Why a handle failed to resolve.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandleError {
    /// Malformed encoding or a generation from the future.
    Bad,
    /// The handle was valid once but no longer names a live object.
    Stale,
}

/// A successfully resolved handle.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedHandle {
    pub id: u64,
    pub path: PathBuf,
    /// Fileid recorded when the handle was created; the resolver
    /// compares it against the current object identity.
    pub fileid: u64,
}

#[derive(Debug)]
struct HandleRow {
    path: PathBuf,
    fsid: u64,
    fileid: u64,
    created_at: SystemTime,
    last_used: u64,
    pins: u32,
}

#[derive(Default)]
struct Tables {
    by_id: HashMap<u64, HandleRow>,
    by_path: HashMap<PathBuf, u64>,
    next_id: u64,
    clock: u64,
}

/// Shared, lock-protected handle table.
pub struct HandleTable {
    inner: Mutex<Tables>,
    generation: u64,
    capacity: usize,
}

impl HandleTable {
    /// Creates a table bounded to `capacity` rows. The generation is
    /// derived from the boot time so handles from earlier instances are
    /// recognized as stale.
    pub fn new(capacity: usize) -> HandleTable {
        let generation = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
            .max(1);
        HandleTable {
            inner: Mutex::new(Tables { next_id: ROOT_HANDLE_ID, ..Tables::default() }),
            generation,
            capacity: capacity.max(2),
        }
    }

    /// Boot generation, also used as the WRITE/COMMIT verifier seed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The 8-byte verifier that changes only across restarts.
    pub fn boot_verifier(&self) -> [u8; 8] {
        self.generation.to_le_bytes()
    }

    /// Returns the row id for `path`, minting a new row when the path is
    /// unknown or its recorded identity changed.
    pub fn handle_for(&self, path: &Path, fsid: u64, fileid: u64) -> u64 {
        let mut tables = self.inner.lock().expect("handle table poisoned");
        tables.clock += 1;
        let tick = tables.clock;

        if let Some(&id) = tables.by_path.get(path) {
            let row = tables.by_id.get_mut(&id).expect("path index out of sync");
            if row.fileid == fileid {
                row.last_used = tick;
                return id;
            }
            // The name now maps to a different object; retire the row.
            tables.by_id.remove(&id);
            tables.by_path.remove(path);
        }

        let id = tables.next_id;
        tables.next_id += 1;
        tables.by_id.insert(
            id,
            HandleRow {
                path: path.to_path_buf(),
                fsid,
                fileid,
                created_at: SystemTime::now(),
                last_used: tick,
                pins: 0,
            },
        );
        tables.by_path.insert(path.to_path_buf(), id);
        self.evict_locked(&mut tables);
        id
    }

    fn evict_locked(&self, tables: &mut Tables) {
        while tables.by_id.len() > self.capacity {
            let victim = tables
                .by_id
                .iter()
                .filter(|(id, row)| **id != ROOT_HANDLE_ID && row.pins == 0)
                .min_by_key(|(_, row)| row.last_used)
                .map(|(id, _)| *id);
            match victim {
                Some(id) => {
                    if let Some(row) = tables.by_id.remove(&id) {
                        tables.by_path.remove(&row.path);
                    }
                }
                // Everything is pinned; allow temporary overshoot.
                None => break,
            }
        }
    }

    /// Resolves raw handle bytes back to a path.
    pub fn resolve(&self, bytes: &[u8]) -> Result<ResolvedHandle, HandleError> {
        if bytes.len() != HANDLE_CORE_LEN && bytes.len() != HANDLE_V2_LEN {
            return Err(HandleError::Bad);
        }
        let id = u64::from_le_bytes(bytes[0..8].try_into().expect("length checked"));
        let gen = u64::from_le_bytes(bytes[8..16].try_into().expect("length checked"));
        if id == 0 || gen == 0 {
            return Err(HandleError::Bad);
        }
        if gen > self.generation {
            return Err(HandleError::Bad);
        }
        if gen < self.generation {
            return Err(HandleError::Stale);
        }

        let mut tables = self.inner.lock().expect("handle table poisoned");
        tables.clock += 1;
        let tick = tables.clock;
        match tables.by_id.get_mut(&id) {
            Some(row) => {
                row.last_used = tick;
                Ok(ResolvedHandle { id, path: row.path.clone(), fileid: row.fileid })
            }
            None => Err(HandleError::Stale),
        }
    }

    /// Encodes the variable-length (v3/v4) form of a handle.
    pub fn encode(&self, id: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(HANDLE_CORE_LEN);
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&self.generation.to_le_bytes());
        out
    }

    /// Encodes the fixed 32-byte v2 form: core handle, fsid, padding.
    pub fn encode_v2(&self, id: u64) -> [u8; HANDLE_V2_LEN] {
        let fsid = {
            let tables = self.inner.lock().expect("handle table poisoned");
            tables.by_id.get(&id).map(|row| row.fsid).unwrap_or(0)
        };
        let mut out = [0_u8; HANDLE_V2_LEN];
        out[0..8].copy_from_slice(&id.to_le_bytes());
        out[8..16].copy_from_slice(&self.generation.to_le_bytes());
        out[16..24].copy_from_slice(&fsid.to_le_bytes());
        out
    }

    /// Drops the row for `path`, if any. Called after unlink, rmdir and
    /// for both ends of a rename.
    pub fn invalidate(&self, path: &Path) {
        let mut tables = self.inner.lock().expect("handle table poisoned");
        if let Some(id) = tables.by_path.remove(path) {
            tables.by_id.remove(&id);
        }
    }

    /// Retires a row whose recorded identity no longer matches the
    /// object found at its path.
    pub fn invalidate_id(&self, id: u64) {
        let mut tables = self.inner.lock().expect("handle table poisoned");
        if let Some(row) = tables.by_id.remove(&id) {
            tables.by_path.remove(&row.path);
        }
    }

    /// Pins a row so eviction skips it (open state, delegations).
    pub fn pin(&self, id: u64) {
        let mut tables = self.inner.lock().expect("handle table poisoned");
        if let Some(row) = tables.by_id.get_mut(&id) {
            row.pins += 1;
        }
    }

    pub fn unpin(&self, id: u64) {
        let mut tables = self.inner.lock().expect("handle table poisoned");
        if let Some(row) = tables.by_id.get_mut(&id) {
            row.pins = row.pins.saturating_sub(1);
        }
    }

    /// Age of the oldest row, for statistics snapshots.
    pub fn oldest_entry(&self) -> Option<SystemTime> {
        let tables = self.inner.lock().expect("handle table poisoned");
        tables.by_id.values().map(|row| row.created_at).min()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("handle table poisoned").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_allocation_is_stable() {
        let table = HandleTable::new(100);
        let a = table.handle_for(Path::new("/export/a"), 1, 42);
        let b = table.handle_for(Path::new("/export/a"), 1, 42);
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn identity_change_mints_a_new_handle() {
        let table = HandleTable::new(100);
        let a = table.handle_for(Path::new("/export/a"), 1, 42);
        let b = table.handle_for(Path::new("/export/a"), 1, 43);
        assert_ne!(a, b);
        assert!(table.resolve(&table.encode(a)).is_err());
    }

    #[test]
    fn resolve_round_trip() {
        let table = HandleTable::new(100);
        let id = table.handle_for(Path::new("/export/b"), 1, 7);
        let resolved = table.resolve(&table.encode(id)).unwrap();
        assert_eq!(resolved.path, Path::new("/export/b"));
        assert_eq!(resolved.fileid, 7);
    }

    #[test]
    fn v2_handles_resolve_too() {
        let table = HandleTable::new(100);
        let id = table.handle_for(Path::new("/export/c"), 9, 8);
        let encoded = table.encode_v2(id);
        let resolved = table.resolve(&encoded).unwrap();
        assert_eq!(resolved.id, id);
    }

    #[test]
    fn wrong_generation_is_stale_or_bad() {
        let table = HandleTable::new(100);
        let id = table.handle_for(Path::new("/export/d"), 1, 9);
        let mut old = table.encode(id);
        old[8..16].copy_from_slice(&(table.generation() - 1).to_le_bytes());
        assert_eq!(table.resolve(&old), Err(HandleError::Stale));

        let mut future = table.encode(id);
        future[8..16].copy_from_slice(&(table.generation() + 1).to_le_bytes());
        assert_eq!(table.resolve(&future), Err(HandleError::Bad));
    }

    #[test]
    fn zero_handle_is_bad() {
        let table = HandleTable::new(100);
        assert_eq!(table.resolve(&[0_u8; HANDLE_CORE_LEN]), Err(HandleError::Bad));
        assert_eq!(table.resolve(&[0_u8; 5]), Err(HandleError::Bad));
    }

    #[test]
    fn eviction_skips_pinned_rows() {
        let table = HandleTable::new(2);
        let root = table.handle_for(Path::new("/export"), 1, 1);
        assert_eq!(root, ROOT_HANDLE_ID);
        let a = table.handle_for(Path::new("/export/a"), 1, 2);
        table.pin(a);
        let _b = table.handle_for(Path::new("/export/b"), 1, 3);
        let _c = table.handle_for(Path::new("/export/c"), 1, 4);
        // Pinned row survived the evictions.
        assert!(table.resolve(&table.encode(a)).is_ok());
        assert!(table.len() <= 3);
    }

    #[test]
    fn invalidate_forgets_the_path() {
        let table = HandleTable::new(100);
        let id = table.handle_for(Path::new("/export/e"), 1, 5);
        table.invalidate(Path::new("/export/e"));
        assert_eq!(table.resolve(&table.encode(id)), Err(HandleError::Stale));
    }
}
