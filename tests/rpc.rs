//! RPC-plane behavior: version negotiation, program resolution,
//! authentication errors and transport limits.

mod support;

use std::io::Cursor;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use nfs_taiga::protocol::rpc::SocketMessageHandler;
use nfs_taiga::xdr::{self, deserialize, Serialize};

use support::{open_reply, TestServer};

#[tokio::test]
async fn rpc_version_1_is_denied_with_mismatch() {
    let server = TestServer::new();
    let reply = server
        .call_raw("10.0.0.1:700", 1, xdr::nfs3::PROGRAM, 3, 0,
                  xdr::rpc::opaque_auth::default(), &[])
        .await;
    let (msg, _) = open_reply(&reply);
    match msg.body {
        xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_DENIED(
            xdr::rpc::rejected_reply::RPC_MISMATCH(info),
        )) => {
            assert_eq!(info, xdr::rpc::mismatch_info { low: 2, high: 2 });
        }
        other => panic!("expected RPC_MISMATCH, got {other:?}"),
    }
}

#[tokio::test]
async fn nfs_version_5_gets_prog_mismatch_2_to_4() {
    let server = TestServer::new();
    let reply = server.call(xdr::nfs3::PROGRAM, 5, 0, &[]).await;
    let (msg, _) = open_reply(&reply);
    match msg.body {
        xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_ACCEPTED(accepted)) => {
            match accepted.reply_data {
                xdr::rpc::accept_body::PROG_MISMATCH(info) => {
                    assert_eq!(info, xdr::rpc::mismatch_info { low: 2, high: 4 });
                }
                other => panic!("expected PROG_MISMATCH, got {other:?}"),
            }
        }
        other => panic!("expected MSG_ACCEPTED, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_program_is_unavailable() {
    let server = TestServer::new();
    let reply = server.call(99_999, 1, 0, &[]).await;
    let (msg, _) = open_reply(&reply);
    match msg.body {
        xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_ACCEPTED(accepted)) => {
            assert_eq!(accepted.reply_data, xdr::rpc::accept_body::PROG_UNAVAIL);
        }
        other => panic!("expected MSG_ACCEPTED, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_procedure_is_unavailable() {
    let server = TestServer::new();
    let reply = server.call(xdr::portmap::PROGRAM, 2, 42, &[]).await;
    let (msg, _) = open_reply(&reply);
    match msg.body {
        xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_ACCEPTED(accepted)) => {
            assert_eq!(accepted.reply_data, xdr::rpc::accept_body::PROC_UNAVAIL);
        }
        other => panic!("expected MSG_ACCEPTED, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_gid_list_is_a_bad_credential() {
    let server = TestServer::new();
    let parms = xdr::rpc::auth_sys_parms {
        stamp: 1,
        machinename: b"host".to_vec(),
        uid: 1000,
        gid: 1000,
        gids: (0..17).collect(),
    };
    let mut body = Vec::new();
    parms.serialize(&mut body).unwrap();
    let cred = xdr::rpc::opaque_auth { flavor: xdr::rpc::auth_flavor::AUTH_SYS, body };

    let reply = server
        .call_raw("10.0.0.1:700", 2, xdr::nfs3::PROGRAM, 3, 1, cred, &[])
        .await;
    let (msg, _) = open_reply(&reply);
    match msg.body {
        xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_DENIED(
            xdr::rpc::rejected_reply::AUTH_ERROR(stat),
        )) => {
            assert_eq!(stat, xdr::rpc::auth_stat::AUTH_BADCRED);
        }
        other => panic!("expected AUTH_ERROR, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthenticated_file_access_is_too_weak() {
    let server = TestServer::new();
    // GETATTR (proc 1) with AUTH_NONE: not a NULL procedure, not a
    // discovery program.
    let reply = server
        .call_raw("10.0.0.1:700", 2, xdr::nfs3::PROGRAM, 3, 1,
                  xdr::rpc::opaque_auth::default(), &[])
        .await;
    let (msg, _) = open_reply(&reply);
    match msg.body {
        xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_DENIED(
            xdr::rpc::rejected_reply::AUTH_ERROR(stat),
        )) => {
            assert_eq!(stat, xdr::rpc::auth_stat::AUTH_TOOWEAK);
        }
        other => panic!("expected AUTH_ERROR, got {other:?}"),
    }
}

#[tokio::test]
async fn truncated_arguments_are_garbage() {
    let server = TestServer::new();
    // LOOKUP with an empty argument stream.
    let reply = server.call(xdr::nfs3::PROGRAM, 3, 3, &[]).await;
    let (msg, _) = open_reply(&reply);
    match msg.body {
        xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_ACCEPTED(accepted)) => {
            assert_eq!(accepted.reply_data, xdr::rpc::accept_body::GARBAGE_ARGS);
        }
        other => panic!("expected MSG_ACCEPTED, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_record_drops_the_connection() {
    let server = TestServer::new();
    let context = server.context("10.0.0.1:700");
    let (mut handler, mut socksend, _replies) = SocketMessageHandler::new(&context);

    let oversize = (server.config.max_request_size + 1) as u32;
    let header = (1u32 << 31) | oversize;
    socksend.write_all(&header.to_be_bytes()).await.unwrap();

    let err = handler.read().await.expect_err("oversize record must error");
    assert!(err.to_string().contains("exceeds max"), "unexpected error: {err:?}");
}

#[tokio::test]
async fn record_under_the_limit_is_dispatched() {
    let server = TestServer::new();
    let context = server.context("10.0.0.1:700");
    let (mut handler, mut socksend, mut replies) = SocketMessageHandler::new(&context);

    let msg = xdr::rpc::rpc_msg {
        xid: 7,
        body: xdr::rpc::rpc_body::CALL(xdr::rpc::call_body {
            rpcvers: 2,
            prog: xdr::nfs3::PROGRAM,
            vers: 3,
            proc: 0,
            cred: xdr::rpc::opaque_auth::default(),
            verf: xdr::rpc::opaque_auth::default(),
        }),
    };
    let mut buf = Vec::new();
    msg.serialize(&mut buf).unwrap();

    // Two fragments exercising record reassembly.
    let first = &buf[..8];
    let rest = &buf[8..];
    socksend.write_all(&(first.len() as u32).to_be_bytes()).await.unwrap();
    socksend.write_all(first).await.unwrap();
    handler.read().await.unwrap();
    let header = (1u32 << 31) | rest.len() as u32;
    socksend.write_all(&header.to_be_bytes()).await.unwrap();
    socksend.write_all(rest).await.unwrap();
    handler.read().await.unwrap();

    let reply = timeout(Duration::from_secs(1), replies.recv())
        .await
        .expect("reply timeout")
        .expect("channel closed")
        .expect("reply error");
    let decoded = deserialize::<xdr::rpc::rpc_msg>(&mut Cursor::new(&reply)).unwrap();
    assert_eq!(decoded.xid, 7);
}
