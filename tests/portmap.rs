//! Portmapper procedures over the dispatcher, including the restricted
//! CALLIT behavior.

mod support;

use nfs_taiga::xdr::{self, deserialize, portmap, Serialize};

use support::{expect_success, TestServer};

fn mapping_args(prog: u32, vers: u32, prot: u32, port: u32) -> Vec<u8> {
    let mut args = Vec::new();
    portmap::mapping { prog, vers, prot, port }.serialize(&mut args).unwrap();
    args
}

#[tokio::test]
async fn getport_for_registered_program() {
    let server = TestServer::new();
    let args = mapping_args(xdr::nfs3::PROGRAM, 3, portmap::IPPROTO_TCP, 0);
    let reply = server.call(portmap::PROGRAM, 2, 3, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<u32>(&mut body).unwrap(), 2049);
}

#[tokio::test]
async fn getport_for_unknown_program_is_zero() {
    let server = TestServer::new();
    let args = mapping_args(300_004, 1, portmap::IPPROTO_TCP, 0);
    let reply = server.call(portmap::PROGRAM, 2, 3, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<u32>(&mut body).unwrap(), 0);
}

#[tokio::test]
async fn set_then_getport_then_unset() {
    let server = TestServer::new();

    let args = mapping_args(200_001, 1, portmap::IPPROTO_UDP, 12_345);
    let reply = server.call(portmap::PROGRAM, 2, 1, &args).await;
    let mut body = expect_success(&reply);
    assert!(deserialize::<bool>(&mut body).unwrap());

    // Duplicate registration on a different port is refused.
    let args = mapping_args(200_001, 1, portmap::IPPROTO_UDP, 54_321);
    let reply = server.call(portmap::PROGRAM, 2, 1, &args).await;
    let mut body = expect_success(&reply);
    assert!(!deserialize::<bool>(&mut body).unwrap());

    let args = mapping_args(200_001, 1, portmap::IPPROTO_UDP, 0);
    let reply = server.call(portmap::PROGRAM, 2, 3, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<u32>(&mut body).unwrap(), 12_345);

    let args = mapping_args(200_001, 1, 0, 0);
    let reply = server.call(portmap::PROGRAM, 2, 2, &args).await;
    let mut body = expect_success(&reply);
    assert!(deserialize::<bool>(&mut body).unwrap());

    let args = mapping_args(200_001, 1, portmap::IPPROTO_UDP, 0);
    let reply = server.call(portmap::PROGRAM, 2, 3, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<u32>(&mut body).unwrap(), 0);
}

#[tokio::test]
async fn set_rejects_zero_program_and_port() {
    let server = TestServer::new();
    for args in [
        mapping_args(0, 1, portmap::IPPROTO_TCP, 999),
        mapping_args(200_002, 1, portmap::IPPROTO_TCP, 0),
    ] {
        let reply = server.call(portmap::PROGRAM, 2, 1, &args).await;
        let mut body = expect_success(&reply);
        assert!(!deserialize::<bool>(&mut body).unwrap());
    }
}

#[tokio::test]
async fn dump_lists_registered_mappings() {
    let server = TestServer::new();
    let reply = server.call(portmap::PROGRAM, 2, 4, &[]).await;
    let mut body = expect_success(&reply);
    let list = deserialize::<portmap::pmaplist>(&mut body).unwrap();
    assert!(list
        .entries
        .iter()
        .any(|m| m.prog == xdr::nfs3::PROGRAM && m.vers == 3 && m.port == 2049));
    assert!(list.entries.iter().any(|m| m.prog == portmap::PROGRAM && m.port == 111));
}

#[tokio::test]
async fn callit_refuses_non_null_targets() {
    let server = TestServer::new();
    let mut args = Vec::new();
    portmap::call_args {
        prog: xdr::nfs3::PROGRAM,
        vers: 3,
        proc: 1, // GETATTR, not NULL
        args: Vec::new(),
    }
    .serialize(&mut args)
    .unwrap();
    let reply = server.call(portmap::PROGRAM, 2, 5, &args).await;
    let mut body = expect_success(&reply);
    let result = deserialize::<portmap::call_result>(&mut body).unwrap();
    assert_eq!(result.port, 0);
    assert!(result.res.is_empty());
}

#[tokio::test]
async fn callit_answers_null_of_registered_programs() {
    let server = TestServer::new();
    let mut args = Vec::new();
    portmap::call_args {
        prog: xdr::nfs3::PROGRAM,
        vers: 3,
        proc: 0,
        args: Vec::new(),
    }
    .serialize(&mut args)
    .unwrap();
    let reply = server.call(portmap::PROGRAM, 2, 5, &args).await;
    let mut body = expect_success(&reply);
    let result = deserialize::<portmap::call_result>(&mut body).unwrap();
    assert_eq!(result.port, 2049);
}

/// Scenario: discover the NFS port, then ping it.
#[tokio::test]
async fn getport_then_nfs_null() {
    let server = TestServer::new();

    let args = mapping_args(xdr::nfs3::PROGRAM, 3, portmap::IPPROTO_TCP, 0);
    let reply = server.call(portmap::PROGRAM, 2, 3, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<u32>(&mut body).unwrap(), 2049);

    let reply = server.call(xdr::nfs3::PROGRAM, 3, 0, &[]).await;
    let body = expect_success(&reply);
    // A NULL reply carries no body beyond the accepted header.
    assert_eq!(body.position() as usize, reply.len());
}
