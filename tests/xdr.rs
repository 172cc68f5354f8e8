//! Codec round-trips and wire-format boundary behavior.

use std::fmt::Debug;
use std::io::Cursor;

use nfs_taiga::xdr::{self, deserialize, Deserialize, Serialize};

fn check<T>(value: &T)
where
    T: Serialize + Deserialize + Default + PartialEq + Debug,
{
    let mut buf = Vec::new();
    value.serialize(&mut buf).expect("serialize");
    assert_eq!(buf.len() % 4, 0, "XDR output must stay 4-byte aligned");
    let decoded = deserialize::<T>(&mut Cursor::new(&buf)).expect("deserialize");
    assert_eq!(value, &decoded);
}

#[test]
fn scalar_round_trips() {
    for v in [false, true] {
        check(&v);
    }
    for v in [i32::MIN, -1, 0, 1, i32::MAX] {
        check(&v);
    }
    for v in [i64::MIN, -1, 0, 1, i64::MAX] {
        check(&v);
    }
    for v in [0u32, 1, 0xdead_beef, u32::MAX] {
        check(&v);
    }
    for v in [0u64, 1, u64::MAX] {
        check(&v);
    }
}

#[test]
fn opaque_round_trips() {
    check(&Vec::<u8>::new());
    check(&vec![1u8]);
    check(&vec![1u8, 2, 3]);
    check(&vec![1u8, 2, 3, 4]);
    check(&vec![0u8; 1021]);
    check(&[7u8; 8]);
    check(&[9u8; 16]);
}

#[test]
fn integer_array_and_string_round_trips() {
    check(&Vec::<u32>::new());
    check(&vec![1u32, 2, 3]);
    check(&String::new());
    check(&String::from("export/data"));
    check(&Some(42u32));
    check(&Option::<u32>::None);
}

/// A declared 5-byte opaque occupies 12 bytes on the wire: length,
/// data, three bytes of padding.
#[test]
fn opaque_padding_is_consumed() {
    let mut buf = Vec::new();
    5u32.serialize(&mut buf).unwrap();
    buf.extend_from_slice(b"abcde");
    buf.extend_from_slice(&[0, 0, 0]);
    let decoded = deserialize::<Vec<u8>>(&mut Cursor::new(&buf)).unwrap();
    assert_eq!(decoded, b"abcde");
}

#[test]
fn nonzero_padding_is_accepted() {
    let mut buf = Vec::new();
    5u32.serialize(&mut buf).unwrap();
    buf.extend_from_slice(b"abcde");
    buf.extend_from_slice(&[0xff, 0xff, 0xff]);
    let decoded = deserialize::<Vec<u8>>(&mut Cursor::new(&buf)).unwrap();
    assert_eq!(decoded, b"abcde");
}

#[test]
fn truncated_padding_is_an_error() {
    let mut buf = Vec::new();
    5u32.serialize(&mut buf).unwrap();
    buf.extend_from_slice(b"abcde");
    buf.extend_from_slice(&[0, 0]); // one padding byte short
    assert!(deserialize::<Vec<u8>>(&mut Cursor::new(&buf)).is_err());
}

#[test]
fn truncated_opaque_is_an_error() {
    let mut buf = Vec::new();
    8u32.serialize(&mut buf).unwrap();
    buf.extend_from_slice(b"abc");
    assert!(deserialize::<Vec<u8>>(&mut Cursor::new(&buf)).is_err());
}

/// An adversarial length prefix must not produce a giant allocation
/// before the stream runs dry.
#[test]
fn huge_declared_length_fails_cleanly() {
    let mut buf = Vec::new();
    u32::MAX.serialize(&mut buf).unwrap();
    buf.extend_from_slice(&[0u8; 64]);
    assert!(deserialize::<Vec<u8>>(&mut Cursor::new(&buf)).is_err());
}

#[test]
fn rpc_message_round_trips() {
    let msg = xdr::rpc::rpc_msg {
        xid: 0xfeed,
        body: xdr::rpc::rpc_body::CALL(xdr::rpc::call_body {
            rpcvers: 2,
            prog: 100003,
            vers: 3,
            proc: 0,
            cred: xdr::rpc::opaque_auth::default(),
            verf: xdr::rpc::opaque_auth::default(),
        }),
    };
    let mut buf = Vec::new();
    msg.serialize(&mut buf).unwrap();
    let decoded = deserialize::<xdr::rpc::rpc_msg>(&mut Cursor::new(&buf)).unwrap();
    assert_eq!(decoded.xid, 0xfeed);
    match decoded.body {
        xdr::rpc::rpc_body::CALL(call) => {
            assert_eq!(call.prog, 100003);
            assert_eq!(call.vers, 3);
        }
        other => panic!("expected CALL, got {other:?}"),
    }
}

#[test]
fn invalid_enum_discriminant_is_an_error() {
    let mut buf = Vec::new();
    77_777u32.serialize(&mut buf).unwrap();
    assert!(deserialize::<xdr::nfs3::nfsstat3>(&mut Cursor::new(&buf)).is_err());
}

#[test]
fn nfs3_write_args_round_trip() {
    let args = xdr::nfs3::file::WRITE3args {
        file: xdr::nfs3::nfs_fh3 { data: vec![1; 16] },
        offset: 4096,
        count: 5,
        stable: xdr::nfs3::file::stable_how::FILE_SYNC,
        data: b"hello".to_vec(),
    };
    let mut buf = Vec::new();
    args.serialize(&mut buf).unwrap();
    let decoded = deserialize::<xdr::nfs3::file::WRITE3args>(&mut Cursor::new(&buf)).unwrap();
    assert_eq!(decoded.offset, 4096);
    assert_eq!(decoded.count, 5);
    assert_eq!(decoded.data, b"hello");
    assert_eq!(decoded.stable, xdr::nfs3::file::stable_how::FILE_SYNC);
}
