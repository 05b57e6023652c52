//! Capability Matrix Tests
//!
//! Checksum replicas never receive content requests: the client refuses
//! them before anything reaches the broker, and the server refuses them
//! again if one arrives anyway.

mod harness;

use std::sync::Arc;

use bitvault::batch::BatchJobDescriptor;
use bitvault::channels::ReplicaType;
use bitvault::client::{permits, ClientError};
use bitvault::protocol::{Credentials, GetFileRequest, Message, MessageKind, Request};

use harness::{deploy, CREDENTIALS};

/// Get, GetFile, RemoveAndGetFile and Batch fail locally on a checksum
/// replica and nothing is published.
#[tokio::test]
async fn test_checksum_replica_refuses_content_kinds() {
    let d = deploy().await;
    let client = d.client("CS");
    let published = d.broker.published_count();

    let errors = vec![
        client.get("test1.arc", 0).await.unwrap_err(),
        client.get_file("test1.arc").await.unwrap_err(),
        client
            .remove_and_get_file("test1.arc", "1234567890", Credentials::new(CREDENTIALS))
            .await
            .unwrap_err(),
        client.batch(BatchJobDescriptor::new("checksum")).await.unwrap_err(),
    ];

    let kinds = [
        MessageKind::Get,
        MessageKind::GetFile,
        MessageKind::RemoveAndGetFile,
        MessageKind::Batch,
    ];
    for (err, kind) in errors.iter().zip(kinds) {
        assert!(matches!(
            err,
            ClientError::NotPermitted {
                kind: k,
                replica_type: ReplicaType::Checksum,
                ..
            } if *k == kind
        ));
        let text = err.to_string();
        assert!(text.contains(kind.as_str()), "{}", text);
        assert!(text.contains("checksum"), "{}", text);
    }

    assert_eq!(d.broker.published_count(), published);
    assert_eq!(d.client_side.metrics().snapshot().capability_rejections, 4);
}

/// Every kind is permitted on a bitarchive replica.
#[test]
fn test_bitarchive_permits_everything() {
    for kind in MessageKind::ALL {
        assert!(permits(ReplicaType::Bitarchive, kind));
    }
}

/// Content requests reach a bitarchive replica and are answered.
#[tokio::test]
async fn test_bitarchive_serves_content() {
    let d = deploy().await;
    d.archive("ONE", "a.arc", b"0123456789").await;
    let client = d.client("ONE");

    let reply = client.get("a.arc", 4).await.unwrap();
    assert!(reply.status.ok);
    assert_eq!(d.transfer_bytes(reply.record), b"456789");

    let reply = client.get_file("a.arc").await.unwrap();
    assert_eq!(d.transfer_bytes(reply.file), b"0123456789");
}

/// A content request smuggled past the client is still refused by the
/// checksum server.
#[tokio::test]
async fn test_checksum_server_refuses_smuggled_request() {
    let d = deploy().await;
    let registry = d.client_side.registry();
    let mut message = Message::request(
        registry.the_cr("CS").unwrap(),
        d.client_side.reply_channel(),
        Request::GetFile(GetFileRequest {
            filename: "test1.arc".into(),
            replica_id: "CS".into(),
        }),
    );

    let reply = d
        .client_side
        .request(&mut message, std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert!(!reply.is_ok());
    assert!(reply.error().unwrap().contains("GetFile"));
    assert_eq!(d.server_side.metrics().snapshot().rejected_requests, 1);
}

/// The factory keeps one client per replica destination.
#[tokio::test]
async fn test_factory_caches_clients() {
    let d = deploy().await;
    let first = d.client("CS");
    let second = d.client("CS");
    assert!(Arc::ptr_eq(&first, &second));
    d.client("ONE");
    assert_eq!(d.clients.len(), 2);
}

/// Batch jobs travel over the bitarchive's broadcast channel and report
/// per-file results with an aggregated output.
#[tokio::test]
async fn test_batch_job_on_bitarchive() {
    let d = deploy().await;
    d.archive("ONE", "a.arc", b"a").await;
    d.archive("ONE", "b.arc", b"b").await;
    d.archive("ONE", "c.warc", b"c").await;

    let reply = d
        .client("ONE")
        .batch(BatchJobDescriptor::new("filelist").with_pattern(r".*\.arc"))
        .await
        .unwrap();
    assert!(reply.status.ok);

    let result = reply.result.unwrap();
    assert_eq!(result.replica_id, "ONE");
    assert_eq!(result.files_processed, 2);
    assert!(result.is_success());
    assert_eq!(d.listing(result.output), vec!["a.arc", "b.arc"]);
    assert_eq!(d.server_side.metrics().snapshot().batch_jobs, 1);
}
