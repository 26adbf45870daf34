//! Gateway against real storage nodes over HTTP
//!
//! Each node is the node crate's router on an ephemeral port with its own
//! temporary data directory.

use bytes::Bytes;
use chunkvault_core::{Password, VaultError};
use chunkvault_gateway::{AppState, GatewayConfig, NodeMonitor, UploadRequest};
use chunkvault_metadata::{MemoryMetadataStore, MetadataStore, NodeStatus};
use chunkvault_network::{HttpChunkStore, NodeClientConfig};
use chunkvault_node::{router, BlobStore, NodeState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

struct TestNode {
    id: String,
    port: u16,
    dir: TempDir,
}

impl TestNode {
    async fn spawn(id: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();
        let app = router(Arc::new(NodeState::new(id, store)), 16 * 1024 * 1024);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            id: id.to_string(),
            port,
            dir,
        }
    }

    async fn blob_count(&self) -> u64 {
        BlobStore::open(self.dir.path()).await.unwrap().count().await.unwrap()
    }
}

/// A port nothing listens on
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn setup(nodes: usize) -> (Arc<AppState>, Arc<MemoryMetadataStore>, Vec<TestNode>) {
    let mut config = GatewayConfig::default();
    config.storage.pbkdf2_iterations = 1_000;
    config.storage.chunk_size = 64 * 1024;

    let chunks = Arc::new(
        HttpChunkStore::new(NodeClientConfig {
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(1),
        })
        .unwrap(),
    );
    let store = Arc::new(MemoryMetadataStore::new());
    let state = Arc::new(AppState::new(&config, store.clone(), chunks).unwrap());

    let mut spawned = Vec::new();
    for i in 1..=nodes {
        let node = TestNode::spawn(&format!("node-{}", i)).await;
        let info = state.register_node(&node.id, "127.0.0.1", node.port).await.unwrap();
        assert_eq!(info.status, NodeStatus::Up);
        spawned.push(node);
    }
    (state, store, spawned)
}

fn upload_request(owner_id: uuid::Uuid, password: &str, data: &[u8]) -> UploadRequest {
    UploadRequest {
        owner_id,
        filename: Some("report.pdf".into()),
        content_type: Some("application/pdf".into()),
        password: Password::from(password),
        data: Bytes::copy_from_slice(data),
    }
}

#[tokio::test]
async fn test_round_trip_over_http() {
    let (state, store, nodes) = setup(3).await;
    let owner = state.register_owner("e2e").await.unwrap().id;
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 253) as u8).collect();

    let receipt = state.upload(upload_request(owner, "pw", &data)).await.unwrap();
    assert_eq!(receipt.chunk_count, 4);
    assert_eq!(store.placements_for_file(receipt.file_id).await.unwrap().len(), 12);
    for node in &nodes {
        assert_eq!(node.blob_count().await, 4);
    }

    let file = state
        .download(receipt.file_id, owner, Password::from("pw"))
        .await
        .unwrap();
    assert_eq!(file.filename, "report.pdf");
    assert_eq!(file.content_type, "application/pdf");
    assert_eq!(file.data, data);

    let err = state
        .download(receipt.file_id, owner, Password::from("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Unauthorized(_)));

    state.delete_file(receipt.file_id, owner).await.unwrap();
    for node in &nodes {
        assert_eq!(node.blob_count().await, 0);
    }
}

#[tokio::test]
async fn test_unreachable_node_is_skipped() {
    let (state, store, nodes) = setup(3).await;
    let port = closed_port().await;

    let info = state.register_node("node-dead", "127.0.0.1", port).await.unwrap();
    assert_eq!(info.status, NodeStatus::Unknown);

    let monitor = NodeMonitor::new(
        store.clone(),
        state.chunk_store().clone(),
        Duration::from_secs(10),
    );
    let summary = monitor.run_check_cycle().await.unwrap();
    assert_eq!(summary.up, 3);
    assert_eq!(summary.down, 1);
    assert_eq!(
        store.get_node("node-dead").await.unwrap().unwrap().status,
        NodeStatus::Down
    );

    let owner = state.register_owner("e2e").await.unwrap().id;
    let receipt = state
        .upload(upload_request(owner, "pw", b"small file"))
        .await
        .unwrap();
    let placements = store.placements_for_file(receipt.file_id).await.unwrap();
    assert_eq!(placements.len(), 3);
    assert!(placements.iter().all(|p| p.node_id != "node-dead"));
    for node in &nodes {
        assert_eq!(node.blob_count().await, 1);
    }
}
