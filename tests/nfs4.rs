//! NFSv4 COMPOUND, session and share-reservation scenarios.

mod support;

use std::io::{Cursor, Read};

use nfs_taiga::xdr::nfs4::{self, bitmap4, bitmap_set, nfsstat4};
use nfs_taiga::xdr::{deserialize, Serialize};

use support::{expect_success, TestServer};

const NFS4_PROGRAM: u32 = 100003;
const COMPOUND: u32 = 1;

/// Builds a COMPOUND request body.
struct CompoundBuilder {
    ops: Vec<u8>,
    numops: u32,
}

impl CompoundBuilder {
    fn new() -> CompoundBuilder {
        CompoundBuilder { ops: Vec::new(), numops: 0 }
    }

    fn op(mut self, opnum: nfs4::NfsOp4, body: &[u8]) -> CompoundBuilder {
        (opnum as u32).serialize(&mut self.ops).unwrap();
        self.ops.extend_from_slice(body);
        self.numops += 1;
        self
    }

    fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        Vec::<u8>::new().serialize(&mut out).unwrap(); // tag
        0u32.serialize(&mut out).unwrap(); // minorversion
        self.numops.serialize(&mut out).unwrap();
        out.extend_from_slice(&self.ops);
        out
    }
}

/// Decoded COMPOUND reply header plus a cursor at the first result.
fn open_compound(reply: &[u8]) -> (nfsstat4, u32, Cursor<&[u8]>) {
    let mut body = expect_success(reply);
    let status = deserialize::<nfsstat4>(&mut body).unwrap();
    let _tag = deserialize::<Vec<u8>>(&mut body).unwrap();
    let numres = deserialize::<u32>(&mut body).unwrap();
    (status, numres, body)
}

fn read_result_header(body: &mut Cursor<&[u8]>) -> (u32, nfsstat4) {
    let opnum = deserialize::<u32>(body).unwrap();
    let status = deserialize::<nfsstat4>(body).unwrap();
    (opnum, status)
}

fn lookup_op(name: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    name.to_vec().serialize(&mut body).unwrap();
    body
}

fn getattr_op() -> Vec<u8> {
    let mut mask = bitmap4::new();
    bitmap_set(&mut mask, nfs4::FATTR4_TYPE);
    bitmap_set(&mut mask, nfs4::FATTR4_SIZE);
    let mut body = Vec::new();
    mask.serialize(&mut body).unwrap();
    body
}

fn write_op(offset: u64, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    nfs4::stateid4::default().serialize(&mut body).unwrap();
    offset.serialize(&mut body).unwrap();
    2u32.serialize(&mut body).unwrap(); // FILE_SYNC4
    data.to_vec().serialize(&mut body).unwrap();
    body
}

fn sequence_op(session: &[u8; 16], slot: u32, seq: u32) -> Vec<u8> {
    let mut body = Vec::new();
    session.serialize(&mut body).unwrap();
    seq.serialize(&mut body).unwrap();
    slot.serialize(&mut body).unwrap();
    slot.serialize(&mut body).unwrap(); // highest slot in use
    true.serialize(&mut body).unwrap(); // cache this
    body
}

fn open_op(owner: &[u8], name: &[u8], share_access: u32, share_deny: u32) -> Vec<u8> {
    let mut body = Vec::new();
    0u32.serialize(&mut body).unwrap(); // seqid
    share_access.serialize(&mut body).unwrap();
    share_deny.serialize(&mut body).unwrap();
    nfs4::state_owner4 { clientid: 1, owner: owner.to_vec() }
        .serialize(&mut body)
        .unwrap();
    1u32.serialize(&mut body).unwrap(); // OPEN4_CREATE
    0u32.serialize(&mut body).unwrap(); // UNCHECKED4
    nfs4::fattr4::default().serialize(&mut body).unwrap();
    0u32.serialize(&mut body).unwrap(); // CLAIM_NULL
    name.to_vec().serialize(&mut body).unwrap();
    body
}

async fn exchange_id(server: &TestServer) -> u64 {
    let mut body = Vec::new();
    [7u8; 8].serialize(&mut body).unwrap();
    b"test-client".to_vec().serialize(&mut body).unwrap();
    0u32.serialize(&mut body).unwrap(); // flags
    0u32.serialize(&mut body).unwrap(); // SP4_NONE
    0u32.serialize(&mut body).unwrap(); // no impl id
    let request = CompoundBuilder::new().op(nfs4::NfsOp4::OP_EXCHANGE_ID, &body).build();
    let reply = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    let (status, numres, mut results) = open_compound(&reply);
    assert_eq!(status, nfsstat4::NFS4_OK);
    assert_eq!(numres, 1);
    let (_, op_status) = read_result_header(&mut results);
    assert_eq!(op_status, nfsstat4::NFS4_OK);
    deserialize::<u64>(&mut results).unwrap()
}

async fn create_session(server: &TestServer, clientid: u64) -> [u8; 16] {
    let chan = nfs4::channel_attrs4 {
        ca_headerpadsize: 0,
        ca_maxrequestsize: 1024 * 1024,
        ca_maxresponsesize: 1024 * 1024,
        ca_maxresponsesize_cached: 64 * 1024,
        ca_maxoperations: 16,
        ca_maxrequests: 8,
        ca_rdma_ird: Vec::new(),
    };
    let mut body = Vec::new();
    clientid.serialize(&mut body).unwrap();
    1u32.serialize(&mut body).unwrap(); // sequence
    0u32.serialize(&mut body).unwrap(); // flags
    chan.serialize(&mut body).unwrap();
    chan.serialize(&mut body).unwrap();
    0x4000_0000u32.serialize(&mut body).unwrap(); // callback program
    1u32.serialize(&mut body).unwrap(); // one security parm
    0u32.serialize(&mut body).unwrap(); // AUTH_NONE
    let request = CompoundBuilder::new().op(nfs4::NfsOp4::OP_CREATE_SESSION, &body).build();
    let reply = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    let (status, _, mut results) = open_compound(&reply);
    assert_eq!(status, nfsstat4::NFS4_OK);
    let (_, op_status) = read_result_header(&mut results);
    assert_eq!(op_status, nfsstat4::NFS4_OK);
    let mut session = [0u8; 16];
    results.read_exact(&mut session).unwrap();
    session
}

/// Scenario: a failing op stops evaluation and its status becomes the
/// COMPOUND status, with exactly the executed results returned.
#[tokio::test]
async fn compound_short_circuits_on_failure() {
    let server = TestServer::new();
    let request = CompoundBuilder::new()
        .op(nfs4::NfsOp4::OP_PUTROOTFH, &[])
        .op(nfs4::NfsOp4::OP_LOOKUP, &lookup_op(b"missing"))
        .op(nfs4::NfsOp4::OP_GETATTR, &getattr_op())
        .build();
    let reply = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;

    let (status, numres, mut results) = open_compound(&reply);
    assert_eq!(status, nfsstat4::NFS4ERR_NOENT);
    assert_eq!(numres, 2);
    let (op, st) = read_result_header(&mut results);
    assert_eq!((op, st), (nfs4::NfsOp4::OP_PUTROOTFH as u32, nfsstat4::NFS4_OK));
    let (op, st) = read_result_header(&mut results);
    assert_eq!((op, st), (nfs4::NfsOp4::OP_LOOKUP as u32, nfsstat4::NFS4ERR_NOENT));
}

#[tokio::test]
async fn putfh_with_zero_handle_is_bad() {
    let server = TestServer::new();
    let mut body = Vec::new();
    vec![0u8; 16].serialize(&mut body).unwrap();
    let request = CompoundBuilder::new().op(nfs4::NfsOp4::OP_PUTFH, &body).build();
    let reply = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    let (status, numres, _) = open_compound(&reply);
    assert_eq!(status, nfsstat4::NFS4ERR_BADHANDLE);
    assert_eq!(numres, 1);
}

#[tokio::test]
async fn getattr_reports_type_and_size() {
    let server = TestServer::new();
    let request = CompoundBuilder::new()
        .op(nfs4::NfsOp4::OP_PUTROOTFH, &[])
        .op(nfs4::NfsOp4::OP_GETATTR, &getattr_op())
        .build();
    let reply = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    let (status, numres, mut results) = open_compound(&reply);
    assert_eq!(status, nfsstat4::NFS4_OK);
    assert_eq!(numres, 2);
    read_result_header(&mut results);
    read_result_header(&mut results);
    let attrs = deserialize::<nfs4::fattr4>(&mut results).unwrap();
    assert!(nfs4::bitmap_get(&attrs.attrmask, nfs4::FATTR4_TYPE));
    assert!(nfs4::bitmap_get(&attrs.attrmask, nfs4::FATTR4_SIZE));
    let mut vals = Cursor::new(&attrs.attr_vals);
    assert_eq!(deserialize::<u32>(&mut vals).unwrap(), nfs4::NF4DIR);
}

#[tokio::test]
async fn minor_version_one_is_refused() {
    let server = TestServer::new();
    let mut request = Vec::new();
    Vec::<u8>::new().serialize(&mut request).unwrap();
    1u32.serialize(&mut request).unwrap(); // minorversion
    0u32.serialize(&mut request).unwrap();
    let reply = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    let (status, numres, _) = open_compound(&reply);
    assert_eq!(status, nfsstat4::NFS4ERR_MINOR_VERS_MISMATCH);
    assert_eq!(numres, 0);
}

#[tokio::test]
async fn mutating_ops_require_a_session() {
    let server = TestServer::new();
    server.fs.add_file("/export/hello.txt", b"hello");
    let request = CompoundBuilder::new()
        .op(nfs4::NfsOp4::OP_PUTROOTFH, &[])
        .op(nfs4::NfsOp4::OP_LOOKUP, &lookup_op(b"hello.txt"))
        .op(nfs4::NfsOp4::OP_WRITE, &write_op(0, b"X"))
        .build();
    let reply = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    let (status, numres, _) = open_compound(&reply);
    assert_eq!(status, nfsstat4::NFS4ERR_OP_NOT_IN_SESSION);
    assert_eq!(numres, 3);
}

/// Scenario: replaying a sequenced WRITE returns the cached reply
/// byte for byte and the write executes at most once.
#[tokio::test]
async fn session_replay_is_idempotent() {
    let server = TestServer::new();
    server.fs.add_file("/export/hello.txt", b"hello");
    let clientid = exchange_id(&server).await;
    let session = create_session(&server, clientid).await;

    let request = CompoundBuilder::new()
        .op(nfs4::NfsOp4::OP_SEQUENCE, &sequence_op(&session, 0, 1))
        .op(nfs4::NfsOp4::OP_PUTROOTFH, &[])
        .op(nfs4::NfsOp4::OP_LOOKUP, &lookup_op(b"hello.txt"))
        .op(nfs4::NfsOp4::OP_WRITE, &write_op(0, b"HELLO"))
        .build();

    let first = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    let (status, numres, _) = open_compound(&first);
    assert_eq!(status, nfsstat4::NFS4_OK);
    assert_eq!(numres, 4);
    let writes_after_first = server.fs.write_calls.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(writes_after_first, 1);

    let second = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    assert_eq!(first, second, "replay must be byte-identical");
    let writes_after_replay = server.fs.write_calls.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(writes_after_replay, 1, "replayed write must not re-execute");
    assert_eq!(server.fs.content_of("/export/hello.txt").unwrap(), b"HELLO");
}

#[tokio::test]
async fn out_of_order_sequence_is_misordered() {
    let server = TestServer::new();
    let clientid = exchange_id(&server).await;
    let session = create_session(&server, clientid).await;

    let request = CompoundBuilder::new()
        .op(nfs4::NfsOp4::OP_SEQUENCE, &sequence_op(&session, 0, 9))
        .op(nfs4::NfsOp4::OP_PUTROOTFH, &[])
        .build();
    let reply = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    let (status, numres, _) = open_compound(&reply);
    assert_eq!(status, nfsstat4::NFS4ERR_SEQ_MISORDERED);
    assert_eq!(numres, 1);
}

/// An exclusive open denies a second opener.
#[tokio::test]
async fn open_share_deny_conflicts() {
    let server = TestServer::new();
    server.fs.add_file("/export/locked.txt", b"x");
    let clientid = exchange_id(&server).await;
    let session = create_session(&server, clientid).await;

    let request = CompoundBuilder::new()
        .op(nfs4::NfsOp4::OP_SEQUENCE, &sequence_op(&session, 0, 1))
        .op(nfs4::NfsOp4::OP_PUTROOTFH, &[])
        .op(
            nfs4::NfsOp4::OP_OPEN,
            &open_op(b"owner-a", b"locked.txt", nfs4::OPEN4_SHARE_ACCESS_BOTH,
                     nfs4::OPEN4_SHARE_DENY_BOTH),
        )
        .build();
    let reply = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    let (status, _, _) = open_compound(&reply);
    assert_eq!(status, nfsstat4::NFS4_OK);

    let request = CompoundBuilder::new()
        .op(nfs4::NfsOp4::OP_SEQUENCE, &sequence_op(&session, 0, 2))
        .op(nfs4::NfsOp4::OP_PUTROOTFH, &[])
        .op(
            nfs4::NfsOp4::OP_OPEN,
            &open_op(b"owner-b", b"locked.txt", nfs4::OPEN4_SHARE_ACCESS_READ,
                     nfs4::OPEN4_SHARE_DENY_NONE),
        )
        .build();
    let reply = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    let (status, numres, _) = open_compound(&reply);
    assert_eq!(status, nfsstat4::NFS4ERR_SHARE_DENIED);
    assert_eq!(numres, 3);
}

/// OPEN then CLOSE releases the share reservation.
#[tokio::test]
async fn close_releases_share_state() {
    let server = TestServer::new();
    server.fs.add_file("/export/once.txt", b"x");
    let clientid = exchange_id(&server).await;
    let session = create_session(&server, clientid).await;

    let request = CompoundBuilder::new()
        .op(nfs4::NfsOp4::OP_SEQUENCE, &sequence_op(&session, 0, 1))
        .op(nfs4::NfsOp4::OP_PUTROOTFH, &[])
        .op(
            nfs4::NfsOp4::OP_OPEN,
            &open_op(b"owner-a", b"once.txt", nfs4::OPEN4_SHARE_ACCESS_BOTH,
                     nfs4::OPEN4_SHARE_DENY_BOTH),
        )
        .build();
    let reply = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    let (status, _, mut results) = open_compound(&reply);
    assert_eq!(status, nfsstat4::NFS4_OK);
    // Skip SEQUENCE and PUTROOTFH results, then read the stateid.
    read_result_header(&mut results);
    let mut skip = vec![0u8; 16 + 4 + 4 + 4 + 4 + 4]; // sequence result body
    results.read_exact(&mut skip).unwrap();
    read_result_header(&mut results);
    read_result_header(&mut results);
    let stateid = deserialize::<nfs4::stateid4>(&mut results).unwrap();

    let mut close_body = Vec::new();
    0u32.serialize(&mut close_body).unwrap();
    stateid.serialize(&mut close_body).unwrap();
    let request = CompoundBuilder::new()
        .op(nfs4::NfsOp4::OP_SEQUENCE, &sequence_op(&session, 0, 2))
        .op(nfs4::NfsOp4::OP_PUTROOTFH, &[])
        .op(nfs4::NfsOp4::OP_LOOKUP, &lookup_op(b"once.txt"))
        .op(nfs4::NfsOp4::OP_CLOSE, &close_body)
        .build();
    let reply = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    let (status, _, _) = open_compound(&reply);
    assert_eq!(status, nfsstat4::NFS4_OK);

    // The exclusive reservation is gone; a new opener succeeds.
    let request = CompoundBuilder::new()
        .op(nfs4::NfsOp4::OP_SEQUENCE, &sequence_op(&session, 0, 3))
        .op(nfs4::NfsOp4::OP_PUTROOTFH, &[])
        .op(
            nfs4::NfsOp4::OP_OPEN,
            &open_op(b"owner-b", b"once.txt", nfs4::OPEN4_SHARE_ACCESS_READ,
                     nfs4::OPEN4_SHARE_DENY_NONE),
        )
        .build();
    let reply = server.call(NFS4_PROGRAM, 4, COMPOUND, &request).await;
    let (status, _, _) = open_compound(&reply);
    assert_eq!(status, nfsstat4::NFS4_OK);
}
