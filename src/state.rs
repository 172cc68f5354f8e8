//! NFSv4 state: client identities, sessions with slot replay caches,
//! open and byte-range lock state, and advisory delegations.
//!
//! Everything lives in flat maps keyed by opaque identifiers (client id,
//! session id, stateid) rather than object graphs, so records can be
//! dropped independently when leases expire. One mutex guards the whole
//! table; the background sweeper takes the same lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use rand::RngCore;
use tracing::{debug, info};

use crate::protocol::xdr::nfs4::{
    self, nfsstat4, sessionid4, state_owner4, stateid4, NFS4_OTHER_SIZE,
};

/// Slots granted to every session.
pub const SESSION_SLOTS: u32 = 8;
/// Operation ceiling advertised to clients per COMPOUND.
pub const SESSION_MAX_OPS: u32 = 16;

/// A client identity established by EXCHANGE_ID.
#[derive(Clone, Debug)]
pub struct ClientRecord {
    pub clientid: u64,
    pub verifier: [u8; 8],
    pub co_owner: Vec<u8>,
    pub last_renew: SystemTime,
    pub reclaim_complete: bool,
}

/// One session slot: last completed sequence and its cached reply.
#[derive(Clone, Debug, Default)]
pub struct Slot {
    pub seq: u32,
    pub reply: Option<Vec<u8>>,
}

/// A session created by CREATE_SESSION.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub session_id: sessionid4,
    pub client_id: u64,
    pub slots: Vec<Slot>,
    pub ca_max_ops: u32,
    pub last_seen: SystemTime,
}

/// Open state referenced by a stateid.
#[derive(Clone, Debug, PartialEq)]
pub struct OpenState {
    pub path: PathBuf,
    pub owner: state_owner4,
    pub share_access: u32,
    pub share_deny: u32,
    /// Handle table row pinned while this open lives.
    pub handle_id: u64,
    pub seqid: u32,
}

/// A held byte-range lock, owned by the open state whose stateid
/// carries `owner` in its other field.
#[derive(Clone, Debug)]
pub struct LockRange {
    pub owner: [u8; NFS4_OTHER_SIZE],
    pub locktype: u32,
    pub offset: u64,
    pub length: u64,
}

impl LockRange {
    fn overlaps(&self, offset: u64, length: u64) -> bool {
        let self_end = self.offset.saturating_add(self.length);
        let other_end = offset.saturating_add(length);
        self.offset < other_end && offset < self_end
    }

    fn is_write(&self) -> bool {
        self.locktype == nfs4::WRITE_LT || self.locktype == nfs4::WRITEW_LT
    }
}

/// An advisory delegation handed out with an OPEN reply.
#[derive(Clone, Debug)]
pub struct Delegation {
    pub path: PathBuf,
    pub clientid: u64,
    pub read_only: bool,
}

/// Outcome of a SEQUENCE slot check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// New request: execute it and cache the reply.
    Execute,
    /// Retransmission: return the cached reply verbatim.
    Replay(Vec<u8>),
    /// Sequence id is neither current nor next.
    Misordered,
    BadSession,
    BadSlot,
}

#[derive(Default)]
struct V4State {
    clients: HashMap<u64, ClientRecord>,
    sessions: HashMap<sessionid4, SessionRecord>,
    opens: HashMap<[u8; NFS4_OTHER_SIZE], OpenState>,
    locks: HashMap<PathBuf, Vec<LockRange>>,
    delegations: HashMap<[u8; NFS4_OTHER_SIZE], Delegation>,
    next_clientid: u64,
    next_stateid: u64,
}

/// Process-wide NFSv4 state table.
pub struct StateTable {
    inner: Mutex<V4State>,
    server_verifier: [u8; 8],
    stateid_salt: [u8; 4],
    lease: Duration,
    grace_until: SystemTime,
}

impl StateTable {
    /// `lease` is the session/lease timeout; a fresh grace period of the
    /// same length starts at boot for clients reclaiming state.
    pub fn new(lease: Duration) -> StateTable {
        let mut verifier = [0_u8; 8];
        rand::thread_rng().fill_bytes(&mut verifier);
        let mut salt = [0_u8; 4];
        rand::thread_rng().fill_bytes(&mut salt);
        StateTable {
            inner: Mutex::new(V4State { next_clientid: 1, next_stateid: 1, ..V4State::default() }),
            server_verifier: verifier,
            stateid_salt: salt,
            lease,
            grace_until: SystemTime::now() + lease,
        }
    }

    /// Server boot verifier returned by EXCHANGE_ID.
    pub fn server_verifier(&self) -> [u8; 8] {
        self.server_verifier
    }

    /// Whether the post-restart grace period is still open.
    pub fn in_grace(&self) -> bool {
        SystemTime::now() < self.grace_until
    }

    fn mint_other(&self, state: &mut V4State) -> [u8; NFS4_OTHER_SIZE] {
        let mut other = [0_u8; NFS4_OTHER_SIZE];
        other[0..4].copy_from_slice(&self.stateid_salt);
        other[4..12].copy_from_slice(&state.next_stateid.to_le_bytes());
        state.next_stateid += 1;
        other
    }

    /// EXCHANGE_ID: returns the client id for this owner, minting a new
    /// identity when the owner is new or rebooted with a new verifier.
    pub fn exchange_id(&self, co_owner: &[u8], verifier: [u8; 8]) -> u64 {
        let mut state = self.inner.lock().expect("state table poisoned");
        let existing = state
            .clients
            .values()
            .find(|c| c.co_owner == co_owner)
            .map(|c| (c.clientid, c.verifier));
        match existing {
            Some((clientid, old_verifier)) if old_verifier == verifier => {
                if let Some(client) = state.clients.get_mut(&clientid) {
                    client.last_renew = SystemTime::now();
                }
                clientid
            }
            Some((clientid, _)) => {
                // Same owner, new boot verifier: the client rebooted and
                // its old state is gone.
                debug!(clientid, "client re-registered with a new verifier");
                Self::purge_client_locked(&mut state, clientid);
                self.insert_client(&mut state, co_owner, verifier)
            }
            None => self.insert_client(&mut state, co_owner, verifier),
        }
    }

    fn insert_client(&self, state: &mut V4State, co_owner: &[u8], verifier: [u8; 8]) -> u64 {
        let clientid = state.next_clientid;
        state.next_clientid += 1;
        state.clients.insert(
            clientid,
            ClientRecord {
                clientid,
                verifier,
                co_owner: co_owner.to_vec(),
                last_renew: SystemTime::now(),
                reclaim_complete: false,
            },
        );
        info!(clientid, "new NFSv4 client");
        clientid
    }

    /// CREATE_SESSION for an established client id.
    pub fn create_session(&self, clientid: u64) -> Result<sessionid4, nfsstat4> {
        let mut state = self.inner.lock().expect("state table poisoned");
        if !state.clients.contains_key(&clientid) {
            return Err(nfsstat4::NFS4ERR_STALE_CLIENTID);
        }
        let mut session_id = [0_u8; 16];
        rand::thread_rng().fill_bytes(&mut session_id);
        state.sessions.insert(
            session_id,
            SessionRecord {
                session_id,
                client_id: clientid,
                slots: vec![Slot::default(); SESSION_SLOTS as usize],
                ca_max_ops: SESSION_MAX_OPS,
                last_seen: SystemTime::now(),
            },
        );
        if let Some(client) = state.clients.get_mut(&clientid) {
            client.last_renew = SystemTime::now();
        }
        Ok(session_id)
    }

    pub fn destroy_session(&self, session_id: &sessionid4) -> bool {
        let mut state = self.inner.lock().expect("state table poisoned");
        state.sessions.remove(session_id).is_some()
    }

    /// DESTROY_CLIENTID; refused while the client still has sessions.
    pub fn destroy_clientid(&self, clientid: u64) -> nfsstat4 {
        let mut state = self.inner.lock().expect("state table poisoned");
        if state.sessions.values().any(|s| s.client_id == clientid) {
            return nfsstat4::NFS4ERR_CLID_INUSE;
        }
        if state.clients.remove(&clientid).is_none() {
            return nfsstat4::NFS4ERR_STALE_CLIENTID;
        }
        Self::purge_client_locked(&mut state, clientid);
        nfsstat4::NFS4_OK
    }

    fn purge_client_locked(state: &mut V4State, clientid: u64) {
        state.clients.remove(&clientid);
        state.sessions.retain(|_, s| s.client_id != clientid);
        let dead: Vec<[u8; NFS4_OTHER_SIZE]> = state
            .opens
            .iter()
            .filter(|(_, open)| open.owner.clientid == clientid)
            .map(|(other, _)| *other)
            .collect();
        for other in dead {
            if let Some(open) = state.opens.remove(&other) {
                if let Some(ranges) = state.locks.get_mut(&open.path) {
                    ranges.retain(|l| l.owner != other);
                }
            }
        }
        state.delegations.retain(|_, d| d.clientid != clientid);
        state.locks.retain(|_, ranges| !ranges.is_empty());
    }

    /// SEQUENCE slot bookkeeping. Renews the session lease on every
    /// outcome short of a bad session.
    pub fn sequence(&self, session_id: &sessionid4, slotid: u32, seqid: u32) -> SequenceOutcome {
        let mut state = self.inner.lock().expect("state table poisoned");
        let Some(session) = state.sessions.get_mut(session_id) else {
            return SequenceOutcome::BadSession;
        };
        session.last_seen = SystemTime::now();
        let client_id = session.client_id;
        let Some(slot) = session.slots.get_mut(slotid as usize) else {
            return SequenceOutcome::BadSlot;
        };

        let outcome = if seqid == slot.seq.wrapping_add(1) {
            SequenceOutcome::Execute
        } else if seqid == slot.seq && slot.seq != 0 {
            match &slot.reply {
                Some(reply) => SequenceOutcome::Replay(reply.clone()),
                None => SequenceOutcome::Misordered,
            }
        } else {
            SequenceOutcome::Misordered
        };

        if let Some(client) = state.clients.get_mut(&client_id) {
            client.last_renew = SystemTime::now();
        }
        outcome
    }

    /// Stores the encoded reply of a completed sequence in its slot.
    pub fn cache_reply(&self, session_id: &sessionid4, slotid: u32, seqid: u32, reply: Vec<u8>) {
        let mut state = self.inner.lock().expect("state table poisoned");
        if let Some(session) = state.sessions.get_mut(session_id) {
            if let Some(slot) = session.slots.get_mut(slotid as usize) {
                slot.seq = seqid;
                slot.reply = Some(reply);
            }
        }
    }

    /// Registers open state and returns its stateid.
    pub fn open(
        &self,
        path: &Path,
        owner: state_owner4,
        share_access: u32,
        share_deny: u32,
        handle_id: u64,
    ) -> stateid4 {
        let mut state = self.inner.lock().expect("state table poisoned");
        let other = self.mint_other(&mut state);
        state.opens.insert(
            other,
            OpenState {
                path: path.to_path_buf(),
                owner,
                share_access,
                share_deny,
                handle_id,
                seqid: 1,
            },
        );
        stateid4 { seqid: 1, other }
    }

    /// Looks up open state for a stateid. The anonymous and bypass
    /// stateids resolve to `None` without error.
    pub fn lookup_open(&self, stateid: &stateid4) -> Result<Option<OpenState>, nfsstat4> {
        if stateid.is_anonymous() || stateid.is_bypass() {
            return Ok(None);
        }
        let state = self.inner.lock().expect("state table poisoned");
        match state.opens.get(&stateid.other) {
            Some(open) => Ok(Some(open.clone())),
            None => Err(nfsstat4::NFS4ERR_BAD_STATEID),
        }
    }

    /// CLOSE: removes the open and its locks, returning the state so
    /// the caller can unpin the handle row.
    pub fn close(&self, stateid: &stateid4) -> Result<OpenState, nfsstat4> {
        let mut state = self.inner.lock().expect("state table poisoned");
        let open = state
            .opens
            .remove(&stateid.other)
            .ok_or(nfsstat4::NFS4ERR_BAD_STATEID)?;
        if let Some(ranges) = state.locks.get_mut(&open.path) {
            ranges.retain(|l| l.owner != stateid.other);
            if ranges.is_empty() {
                state.locks.remove(&open.path);
            }
        }
        Ok(open)
    }

    /// LOCK: acquires a byte-range lock for the open named by
    /// `stateid`, failing with the first conflicting range.
    pub fn lock(
        &self,
        stateid: &stateid4,
        locktype: u32,
        offset: u64,
        length: u64,
    ) -> Result<stateid4, LockRange> {
        let mut state = self.inner.lock().expect("state table poisoned");
        let Some(open) = state.opens.get(&stateid.other).cloned() else {
            // Unknown stateid surfaces as a conflict on the whole range.
            return Err(LockRange { owner: [0; NFS4_OTHER_SIZE], locktype, offset, length });
        };
        let wants_write = locktype == nfs4::WRITE_LT || locktype == nfs4::WRITEW_LT;
        if let Some(ranges) = state.locks.get(&open.path) {
            for range in ranges {
                if range.owner != stateid.other
                    && range.overlaps(offset, length)
                    && (wants_write || range.is_write())
                {
                    return Err(range.clone());
                }
            }
        }
        state.locks.entry(open.path.clone()).or_default().push(LockRange {
            owner: stateid.other,
            locktype,
            offset,
            length,
        });
        Ok(stateid4 { seqid: stateid.seqid.wrapping_add(1), other: stateid.other })
    }

    /// LOCKT: tests for a conflicting lock without acquiring.
    pub fn test_lock(
        &self,
        path: &Path,
        owner: &state_owner4,
        locktype: u32,
        offset: u64,
        length: u64,
    ) -> Option<LockRange> {
        let state = self.inner.lock().expect("state table poisoned");
        let wants_write = locktype == nfs4::WRITE_LT || locktype == nfs4::WRITEW_LT;
        let ranges = state.locks.get(path)?;
        for range in ranges {
            if !(range.overlaps(offset, length) && (wants_write || range.is_write())) {
                continue;
            }
            let same_owner = state
                .opens
                .get(&range.owner)
                .map(|open| &open.owner == owner)
                .unwrap_or(false);
            if !same_owner {
                return Some(range.clone());
            }
        }
        None
    }

    /// LOCKU: drops the owner's locks overlapping the range.
    pub fn unlock(&self, stateid: &stateid4, offset: u64, length: u64) -> nfsstat4 {
        let mut state = self.inner.lock().expect("state table poisoned");
        let Some(open) = state.opens.get(&stateid.other).cloned() else {
            return nfsstat4::NFS4ERR_BAD_STATEID;
        };
        if let Some(ranges) = state.locks.get_mut(&open.path) {
            ranges.retain(|l| !(l.owner == stateid.other && l.overlaps(offset, length)));
            if ranges.is_empty() {
                state.locks.remove(&open.path);
            }
        }
        nfsstat4::NFS4_OK
    }

    /// DELEGRETURN: releases a delegation if one is held.
    pub fn delegreturn(&self, stateid: &stateid4) -> nfsstat4 {
        let mut state = self.inner.lock().expect("state table poisoned");
        match state.delegations.remove(&stateid.other) {
            Some(_) => nfsstat4::NFS4_OK,
            None => nfsstat4::NFS4ERR_BAD_STATEID,
        }
    }

    /// Explicit lease renewal (the RENEW operation).
    pub fn renew(&self, clientid: u64) -> nfsstat4 {
        let mut state = self.inner.lock().expect("state table poisoned");
        match state.clients.get_mut(&clientid) {
            Some(client) => {
                client.last_renew = SystemTime::now();
                nfsstat4::NFS4_OK
            }
            None => nfsstat4::NFS4ERR_STALE_CLIENTID,
        }
    }

    /// RECLAIM_COMPLETE for a client.
    pub fn reclaim_complete(&self, clientid: u64) -> nfsstat4 {
        let mut state = self.inner.lock().expect("state table poisoned");
        match state.clients.get_mut(&clientid) {
            Some(client) => {
                client.reclaim_complete = true;
                nfsstat4::NFS4_OK
            }
            None => nfsstat4::NFS4ERR_STALE_CLIENTID,
        }
    }

    /// Client id owning a session, renewing nothing.
    pub fn session_client(&self, session_id: &sessionid4) -> Option<u64> {
        let state = self.inner.lock().expect("state table poisoned");
        state.sessions.get(session_id).map(|s| s.client_id)
    }

    /// Expires clients and sessions idle past the lease; their opens,
    /// locks and delegations go with them. Returns the pinned handle
    /// rows that were released so the caller can unpin them.
    pub fn sweep(&self) -> Vec<u64> {
        let now = SystemTime::now();
        let mut state = self.inner.lock().expect("state table poisoned");
        let expired: Vec<u64> = state
            .clients
            .values()
            .filter(|c| {
                now.duration_since(c.last_renew).map(|idle| idle >= self.lease).unwrap_or(false)
            })
            .map(|c| c.clientid)
            .collect();
        let mut released = Vec::new();
        for clientid in expired {
            info!(clientid, "expiring NFSv4 client lease");
            released.extend(
                state
                    .opens
                    .values()
                    .filter(|open| open.owner.clientid == clientid)
                    .map(|open| open.handle_id),
            );
            Self::purge_client_locked(&mut state, clientid);
        }
        state
            .sessions
            .retain(|_, s| now.duration_since(s.last_seen).map(|i| i < self.lease).unwrap_or(true));
        released
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().expect("state table poisoned").sessions.len()
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().expect("state table poisoned").opens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> StateTable {
        StateTable::new(Duration::from_secs(3600))
    }

    fn owner(clientid: u64) -> state_owner4 {
        state_owner4 { clientid, owner: b"owner".to_vec() }
    }

    #[test]
    fn exchange_id_is_idempotent_per_verifier() {
        let t = table();
        let a = t.exchange_id(b"client-a", [1; 8]);
        let b = t.exchange_id(b"client-a", [1; 8]);
        assert_eq!(a, b);
        let c = t.exchange_id(b"client-a", [2; 8]);
        assert_ne!(a, c);
    }

    #[test]
    fn sequence_execute_replay_misorder() {
        let t = table();
        let clientid = t.exchange_id(b"c", [1; 8]);
        let session = t.create_session(clientid).unwrap();

        assert_eq!(t.sequence(&session, 0, 1), SequenceOutcome::Execute);
        t.cache_reply(&session, 0, 1, b"reply-1".to_vec());

        assert_eq!(t.sequence(&session, 0, 1), SequenceOutcome::Replay(b"reply-1".to_vec()));
        assert_eq!(t.sequence(&session, 0, 2), SequenceOutcome::Execute);
        t.cache_reply(&session, 0, 2, b"reply-2".to_vec());
        assert_eq!(t.sequence(&session, 0, 5), SequenceOutcome::Misordered);
        assert_eq!(t.sequence(&session, 99, 1), SequenceOutcome::BadSlot);
        assert_eq!(t.sequence(&[0xaa; 16], 0, 1), SequenceOutcome::BadSession);
    }

    #[test]
    fn open_close_lifecycle() {
        let t = table();
        let clientid = t.exchange_id(b"c", [1; 8]);
        let stateid = t.open(Path::new("/export/f"), owner(clientid), 3, 0, 10);
        assert!(t.lookup_open(&stateid).unwrap().is_some());
        let open = t.close(&stateid).unwrap();
        assert_eq!(open.handle_id, 10);
        assert_eq!(t.lookup_open(&stateid), Err(nfsstat4::NFS4ERR_BAD_STATEID));
    }

    #[test]
    fn write_locks_conflict() {
        let t = table();
        let clientid = t.exchange_id(b"c", [1; 8]);
        let sid_a = t.open(Path::new("/export/f"), owner(clientid), 3, 0, 1);
        let sid_b = t.open(Path::new("/export/f"), owner(clientid), 3, 0, 1);

        t.lock(&sid_a, nfs4::WRITE_LT, 0, 100).unwrap();
        assert!(t.lock(&sid_b, nfs4::READ_LT, 50, 10).is_err());
        assert!(t.lock(&sid_b, nfs4::READ_LT, 100, 10).is_ok());

        assert_eq!(t.unlock(&sid_a, 0, 100), nfsstat4::NFS4_OK);
        assert!(t.lock(&sid_b, nfs4::READ_LT, 0, 10).is_ok());
    }

    #[test]
    fn lease_expiry_releases_everything() {
        let t = StateTable::new(Duration::from_millis(1));
        let clientid = t.exchange_id(b"c", [1; 8]);
        let session = t.create_session(clientid).unwrap();
        let _sid = t.open(Path::new("/export/f"), owner(clientid), 3, 0, 77);
        std::thread::sleep(Duration::from_millis(5));
        let released = t.sweep();
        assert_eq!(released, vec![77]);
        assert_eq!(t.open_count(), 0);
        assert_eq!(t.sequence(&session, 0, 1), SequenceOutcome::BadSession);
    }
}
