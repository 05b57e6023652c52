//! Shared deployment for integration tests
//!
//! One in-process broker, one "server" process hosting two bitarchive
//! replicas (ONE, TWO) and a checksum replica (CS), and one "client"
//! process holding the replica clients. Both processes share a staging
//! directory for file transfer.

#![allow(dead_code)]

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use bitvault::batch::{BatchExecutor, JobRegistry};
use bitvault::bitarchive::BitarchiveServer;
use bitvault::channels::{ChannelRegistry, Replica};
use bitvault::checksum::{md5_hex, ChecksumServer, ChecksumServerSettings};
use bitvault::client::{ReplicaClient, ReplicaClientFactory};
use bitvault::connection::{ConnectionManager, RetryPolicy};
use bitvault::observability::MetricsRegistry;
use bitvault::server::{ReplicaServer, ServerRegistry};
use bitvault::transfer::{FileRef, FileTransfer, LocalTransfer};
use bitvault::transport::LocalBroker;
use tempfile::TempDir;

pub const CREDENTIALS: &str = "42";
pub const SEEDED_CATALOG: &str = "test1.arc##1234567890\ntest2.arc##0987654321\n";

pub fn replicas() -> Vec<Replica> {
    vec![
        Replica::bitarchive("ONE", "one"),
        Replica::bitarchive("TWO", "two"),
        Replica::checksum("CS", "cs"),
    ]
}

pub fn quick_policy(max_attempts: usize) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(4), 2.0)
}

pub struct Deployment {
    pub temp: TempDir,
    pub broker: LocalBroker,
    pub transfer: Arc<LocalTransfer>,
    pub server_side: Arc<ConnectionManager>,
    pub servers: ServerRegistry,
    pub checksum: Arc<ChecksumServer>,
    pub one: Arc<BitarchiveServer>,
    pub two: Arc<BitarchiveServer>,
    pub client_side: Arc<ConnectionManager>,
    pub clients: Arc<ReplicaClientFactory>,
}

pub struct Options {
    pub use_precomputed_checksum: bool,
    pub max_attempts: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            use_precomputed_checksum: false,
            max_attempts: 4,
        }
    }
}

pub async fn deploy() -> Deployment {
    deploy_with(Options::default()).await
}

pub async fn deploy_with(options: Options) -> Deployment {
    let temp = TempDir::new().unwrap();
    let broker = LocalBroker::new();
    let transfer = Arc::new(LocalTransfer::new(temp.path().join("transfer")));

    let server_side = ConnectionManager::connect(
        Arc::new(broker.clone()),
        ChannelRegistry::new("TEST", "SERVER", replicas()).unwrap(),
        quick_policy(options.max_attempts),
        Arc::new(MetricsRegistry::new()),
    )
    .await
    .unwrap();
    let metrics = Arc::clone(server_side.metrics());

    let catalog = temp.path().join("checksums.md5");
    fs::write(&catalog, SEEDED_CATALOG).unwrap();
    let checksum = Arc::new(
        ChecksumServer::new(
            Replica::checksum("CS", "cs"),
            &catalog,
            transfer.clone(),
            ChecksumServerSettings {
                credentials: CREDENTIALS.into(),
                use_precomputed_checksum: options.use_precomputed_checksum,
            },
            Arc::clone(&metrics),
        )
        .unwrap(),
    );
    let archive = |id: &str, name: &str| {
        Arc::new(
            BitarchiveServer::new(
                Replica::bitarchive(id, name),
                temp.path().join(name),
                transfer.clone(),
                BatchExecutor::new(
                    Arc::new(JobRegistry::with_builtin_jobs()),
                    Duration::from_secs(30),
                ),
                CREDENTIALS,
                Arc::clone(&metrics),
            )
            .unwrap(),
        )
    };
    let one = archive("ONE", "one");
    let two = archive("TWO", "two");

    let servers = ServerRegistry::new(Arc::clone(&server_side));
    for server in [
        checksum.clone() as Arc<dyn ReplicaServer>,
        one.clone() as Arc<dyn ReplicaServer>,
        two.clone() as Arc<dyn ReplicaServer>,
    ] {
        servers.start(server).await.unwrap();
    }

    let client_side = ConnectionManager::connect(
        Arc::new(broker.clone()),
        ChannelRegistry::new("TEST", "CLIENT", replicas()).unwrap(),
        quick_policy(options.max_attempts),
        Arc::new(MetricsRegistry::new()),
    )
    .await
    .unwrap();
    let clients = Arc::new(ReplicaClientFactory::new(
        Arc::clone(&client_side),
        Duration::from_secs(5),
    ));

    Deployment {
        temp,
        broker,
        transfer,
        server_side,
        servers,
        checksum,
        one,
        two,
        client_side,
        clients,
    }
}

impl Deployment {
    pub fn client(&self, replica_id: &str) -> Arc<ReplicaClient> {
        self.clients.client(replica_id).unwrap()
    }

    pub fn stage(&self, name: &str, content: &[u8]) -> FileRef {
        self.transfer.put(name, content).unwrap()
    }

    /// Lines of a transferred listing; the listing is disposed.
    pub fn listing(&self, output: Option<FileRef>) -> Vec<String> {
        let bytes = self.transfer.take(&output.unwrap()).unwrap();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Content of a transferred file; the file is disposed.
    pub fn transfer_bytes(&self, file: Option<FileRef>) -> Vec<u8> {
        self.transfer.take(&file.unwrap()).unwrap()
    }

    /// Upload `content` as `name` to a replica and assert success.
    pub async fn archive(&self, replica_id: &str, name: &str, content: &[u8]) {
        let reply = self
            .client(replica_id)
            .upload(self.stage(name, content), Some(md5_hex(content)))
            .await
            .unwrap();
        assert!(
            reply.status.ok,
            "upload of {} to {} failed: {:?}",
            name,
            replica_id,
            reply.status.error
        );
    }
}
