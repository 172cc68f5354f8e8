//! NFSv3 end-to-end scenarios through the dispatcher.

mod support;

use std::path::PathBuf;

use nfs_taiga::config::Config;
use nfs_taiga::security::{AclEntry, AclKind, FileAcl};
use nfs_taiga::xdr::nfs3::{self, file::stable_how, nfsstat3};
use nfs_taiga::xdr::{deserialize, Serialize};

use support::{expect_success, mount_root, TestServer, EXPORT_ROOT, TEST_GID, TEST_UID};

fn fh(data: Vec<u8>) -> nfs3::nfs_fh3 {
    nfs3::nfs_fh3 { data }
}

async fn lookup(server: &TestServer, dir: &[u8], name: &[u8]) -> (nfsstat3, Option<Vec<u8>>) {
    let mut args = Vec::new();
    nfs3::diropargs3 { dir: fh(dir.to_vec()), name: name.into() }
        .serialize(&mut args)
        .unwrap();
    let reply = server.call(nfs3::PROGRAM, 3, 3, &args).await;
    let mut body = expect_success(&reply);
    let status = deserialize::<nfsstat3>(&mut body).unwrap();
    if status == nfsstat3::NFS3_OK {
        let handle = deserialize::<nfs3::nfs_fh3>(&mut body).unwrap();
        (status, Some(handle.data))
    } else {
        (status, None)
    }
}

/// Scenario: write/read round-trip with a stable WRITE and a COMMIT
/// returning the same boot verifier.
#[tokio::test]
async fn write_read_commit_round_trip() {
    let server = TestServer::new();
    server.fs.add_file("/export/hello.txt", b"");
    let root = mount_root(&server).await;

    let (status, handle) = lookup(&server, &root, b"hello.txt").await;
    assert_eq!(status, nfsstat3::NFS3_OK);
    let handle = handle.unwrap();

    // WRITE "Hello", FILE_SYNC.
    let mut args = Vec::new();
    nfs3::file::WRITE3args {
        file: fh(handle.clone()),
        offset: 0,
        count: 5,
        stable: stable_how::FILE_SYNC,
        data: b"Hello".to_vec(),
    }
    .serialize(&mut args)
    .unwrap();
    let reply = server.call(nfs3::PROGRAM, 3, 7, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<nfsstat3>(&mut body).unwrap(), nfsstat3::NFS3_OK);
    let resok = deserialize::<nfs3::file::WRITE3resok>(&mut body).unwrap();
    assert_eq!(resok.count, 5);
    assert_eq!(resok.committed, stable_how::FILE_SYNC);
    let write_verf = resok.verf;
    // WCC data has the pre-op size and the post-op attributes.
    match resok.file_wcc.before {
        Some(before) => assert_eq!(before.size, 0),
        None => panic!("expected pre-op attributes"),
    }
    match resok.file_wcc.after {
        Some(after) => assert_eq!(after.size, 5),
        None => panic!("expected post-op attributes"),
    }

    // READ back.
    let mut args = Vec::new();
    nfs3::file::READ3args { file: fh(handle.clone()), offset: 0, count: 5 }
        .serialize(&mut args)
        .unwrap();
    let reply = server.call(nfs3::PROGRAM, 3, 6, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<nfsstat3>(&mut body).unwrap(), nfsstat3::NFS3_OK);
    let resok = deserialize::<nfs3::file::READ3resok>(&mut body).unwrap();
    assert_eq!(resok.data, b"Hello");
    assert!(resok.eof);

    // COMMIT returns the same verifier as WRITE.
    let mut args = Vec::new();
    nfs3::file::COMMIT3args { file: fh(handle), offset: 0, count: 5 }
        .serialize(&mut args)
        .unwrap();
    let reply = server.call(nfs3::PROGRAM, 3, 21, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<nfsstat3>(&mut body).unwrap(), nfsstat3::NFS3_OK);
    let resok = deserialize::<nfs3::file::COMMIT3resok>(&mut body).unwrap();
    assert_eq!(resok.verf, write_verf);
}

/// Scenario: `..` as a LOOKUP name is refused and audited.
#[tokio::test]
async fn dotdot_lookup_is_denied_and_audited() {
    let audit_file = tempfile::NamedTempFile::new().unwrap();
    let server = TestServer::with_config(Config {
        root_path: PathBuf::from(EXPORT_ROOT),
        audit_log_file: Some(audit_file.path().to_path_buf()),
        ..Config::default()
    });
    let root = mount_root(&server).await;

    let (status, _) = lookup(&server, &root, b"..").await;
    assert_eq!(status, nfsstat3::NFS3ERR_ACCES);

    let log = std::fs::read_to_string(audit_file.path()).unwrap();
    assert!(
        log.lines().any(|l| l.contains("op=LOOKUP") && l.contains("success=false")),
        "missing audit entry in: {log}"
    );
}

#[tokio::test]
async fn getattr_reports_directory_kind() {
    let server = TestServer::new();
    let root = mount_root(&server).await;

    let mut args = Vec::new();
    fh(root).serialize(&mut args).unwrap();
    let reply = server.call(nfs3::PROGRAM, 3, 1, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<nfsstat3>(&mut body).unwrap(), nfsstat3::NFS3_OK);
    let attr = deserialize::<nfs3::fattr3>(&mut body).unwrap();
    assert_eq!(attr.ftype, nfs3::ftype3::NF3DIR);
}

#[tokio::test]
async fn stale_handle_after_remove() {
    let server = TestServer::new();
    server.fs.add_file("/export/gone.txt", b"x");
    let root = mount_root(&server).await;
    let (_, handle) = lookup(&server, &root, b"gone.txt").await;
    let handle = handle.unwrap();

    // REMOVE it.
    let mut args = Vec::new();
    nfs3::diropargs3 { dir: fh(root), name: b"gone.txt".as_slice().into() }
        .serialize(&mut args)
        .unwrap();
    let reply = server.call(nfs3::PROGRAM, 3, 12, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<nfsstat3>(&mut body).unwrap(), nfsstat3::NFS3_OK);

    // The old handle is stale now.
    let mut args = Vec::new();
    fh(handle).serialize(&mut args).unwrap();
    let reply = server.call(nfs3::PROGRAM, 3, 1, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<nfsstat3>(&mut body).unwrap(), nfsstat3::NFS3ERR_STALE);
}

/// Scenario: ACL evaluation gates WRITE by uid.
#[tokio::test]
async fn acl_enforcement_by_uid() {
    let server = TestServer::new();
    server.fs.add_file("/export/guarded.txt", b"data");
    server.security.set_acl(
        std::path::Path::new("/export/guarded.txt"),
        FileAcl {
            entries: vec![
                AclEntry { kind: AclKind::User, id: TEST_UID, permissions: 7, name: None },
                AclEntry { kind: AclKind::Other, id: 0, permissions: 4, name: None },
            ],
            default_mask: 7,
            is_directory: false,
        },
    );
    let root = mount_root(&server).await;
    let (_, handle) = lookup(&server, &root, b"guarded.txt").await;
    let handle = handle.unwrap();

    let write_args = |handle: &[u8]| {
        let mut args = Vec::new();
        nfs3::file::WRITE3args {
            file: fh(handle.to_vec()),
            offset: 0,
            count: 3,
            stable: stable_how::FILE_SYNC,
            data: b"new".to_vec(),
        }
        .serialize(&mut args)
        .unwrap();
        args
    };

    // uid 2000 falls through to the Other entry: read-only.
    let reply = server
        .call_as("10.0.0.9:700", 2000, 2000, nfs3::PROGRAM, 3, 7, &write_args(&handle))
        .await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<nfsstat3>(&mut body).unwrap(), nfsstat3::NFS3ERR_ACCES);

    // The owner writes fine.
    let reply = server
        .call_as("10.0.0.1:700", TEST_UID, TEST_GID, nfs3::PROGRAM, 3, 7, &write_args(&handle))
        .await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<nfsstat3>(&mut body).unwrap(), nfsstat3::NFS3_OK);
}

/// A writer's SharedWrite record denies reads from another client.
#[tokio::test]
async fn share_mode_conflict_between_clients() {
    let server = TestServer::new();
    server.fs.add_file("/export/busy.txt", b"contents");
    let root = mount_root(&server).await;
    let (_, handle) = lookup(&server, &root, b"busy.txt").await;
    let handle = handle.unwrap();

    let mut args = Vec::new();
    nfs3::file::WRITE3args {
        file: fh(handle.clone()),
        offset: 0,
        count: 2,
        stable: stable_how::FILE_SYNC,
        data: b"hi".to_vec(),
    }
    .serialize(&mut args)
    .unwrap();
    let reply = server
        .call_as("10.0.0.1:700", TEST_UID, TEST_GID, nfs3::PROGRAM, 3, 7, &args)
        .await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<nfsstat3>(&mut body).unwrap(), nfsstat3::NFS3_OK);

    // A different client's read hits the deny-read cell.
    let mut args = Vec::new();
    nfs3::file::READ3args { file: fh(handle), offset: 0, count: 2 }
        .serialize(&mut args)
        .unwrap();
    let reply = server
        .call_as("10.9.9.9:700", TEST_UID, TEST_GID, nfs3::PROGRAM, 3, 6, &args)
        .await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<nfsstat3>(&mut body).unwrap(), nfsstat3::NFS3ERR_ACCES);
}

#[tokio::test]
async fn readdir_pages_with_cookies() {
    let server = TestServer::new();
    for name in ["a.txt", "b.txt", "c.txt"] {
        server.fs.add_file(&format!("/export/{name}"), b"x");
    }
    let root = mount_root(&server).await;

    let mut args = Vec::new();
    nfs3::dir::READDIR3args {
        dir: fh(root.clone()),
        cookie: 0,
        cookieverf: [0; 8],
        count: 4096,
    }
    .serialize(&mut args)
    .unwrap();
    let reply = server.call(nfs3::PROGRAM, 3, 16, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<nfsstat3>(&mut body).unwrap(), nfsstat3::NFS3_OK);
    let _dir_attr = deserialize::<nfs3::post_op_attr>(&mut body).unwrap();
    let _verf = deserialize::<[u8; 8]>(&mut body).unwrap();

    let mut names = Vec::new();
    while deserialize::<bool>(&mut body).unwrap() {
        let entry = deserialize::<nfs3::dir::entry3>(&mut body).unwrap();
        names.push(String::from_utf8_lossy(entry.name.as_ref()).into_owned());
    }
    let eof = deserialize::<bool>(&mut body).unwrap();
    assert!(eof);
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
}

#[tokio::test]
async fn create_and_mkdir_return_handles_and_wcc() {
    let server = TestServer::new();
    let root = mount_root(&server).await;

    let mut args = Vec::new();
    nfs3::file::CREATE3args {
        r#where: nfs3::diropargs3 { dir: fh(root.clone()), name: b"new.txt".as_slice().into() },
        how: nfs3::file::createhow3::GUARDED(nfs3::sattr3 {
            mode: Some(0o600),
            ..nfs3::sattr3::default()
        }),
    }
    .serialize(&mut args)
    .unwrap();
    let reply = server.call(nfs3::PROGRAM, 3, 8, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<nfsstat3>(&mut body).unwrap(), nfsstat3::NFS3_OK);
    let resok = deserialize::<nfs3::file::CREATE3resok>(&mut body).unwrap();
    assert!(resok.obj.is_some());
    match resok.obj_attributes {
        Some(attr) => assert_eq!(attr.mode, 0o600),
        None => panic!("expected attributes"),
    }

    // A second GUARDED create of the same name fails EXIST.
    let reply = server.call(nfs3::PROGRAM, 3, 8, &args).await;
    let mut body = expect_success(&reply);
    assert_eq!(deserialize::<nfsstat3>(&mut body).unwrap(), nfsstat3::NFS3ERR_EXIST);
}
