//! In-process node cluster
//!
//! Simulates storage nodes keyed by node id. Nodes can be taken offline,
//! blobs can be dropped or corrupted, and every successful write is counted.
//! Used for testing and development.

use crate::ChunkStore;
use async_trait::async_trait;
use bytes::Bytes;
use chunkvault_core::{NodeEndpoint, Result, VaultError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

#[derive(Default)]
struct FakeNode {
    online: bool,
    blobs: HashMap<Uuid, Bytes>,
}

/// [`ChunkStore`] backed by in-memory nodes
#[derive(Default)]
pub struct MemoryNodeCluster {
    nodes: RwLock<HashMap<String, FakeNode>>,
    writes: AtomicU64,
    reads: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryNodeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster with online nodes `node-1..=node-n`
    pub fn with_nodes(n: usize) -> Self {
        let cluster = Self::new();
        for i in 1..=n {
            cluster.add_node(&format!("node-{}", i));
        }
        cluster
    }

    pub fn add_node(&self, node_id: &str) {
        self.nodes.write().insert(
            node_id.to_string(),
            FakeNode {
                online: true,
                blobs: HashMap::new(),
            },
        );
    }

    /// Offline nodes fail every operation and probe unhealthy. Blobs survive.
    pub fn set_online(&self, node_id: &str, online: bool) {
        if let Some(node) = self.nodes.write().get_mut(node_id) {
            node.online = online;
        }
    }

    /// Lose a blob as if the node's disk was wiped.
    pub fn drop_blob(&self, node_id: &str, blob_id: Uuid) -> bool {
        self.nodes
            .write()
            .get_mut(node_id)
            .map(|n| n.blobs.remove(&blob_id).is_some())
            .unwrap_or(false)
    }

    /// Flip one byte of a stored blob.
    pub fn corrupt_blob(&self, node_id: &str, blob_id: Uuid) -> bool {
        let mut nodes = self.nodes.write();
        let Some(blob) = nodes.get_mut(node_id).and_then(|n| n.blobs.get_mut(&blob_id)) else {
            return false;
        };
        let mut bytes = blob.to_vec();
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xFF;
        }
        *blob = Bytes::from(bytes);
        true
    }

    pub fn blob(&self, node_id: &str, blob_id: Uuid) -> Option<Bytes> {
        self.nodes
            .read()
            .get(node_id)
            .and_then(|n| n.blobs.get(&blob_id).cloned())
    }

    pub fn blob_count(&self, node_id: &str) -> usize {
        self.nodes
            .read()
            .get(node_id)
            .map(|n| n.blobs.len())
            .unwrap_or(0)
    }

    pub fn total_blobs(&self) -> usize {
        self.nodes.read().values().map(|n| n.blobs.len()).sum()
    }

    /// Successful puts since creation or the last reset
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    pub fn reset_counters(&self) {
        self.writes.store(0, Ordering::Relaxed);
        self.reads.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
    }

    fn unreachable(node: &NodeEndpoint) -> VaultError {
        VaultError::transport(&node.id, "node unreachable")
    }
}

#[async_trait]
impl ChunkStore for MemoryNodeCluster {
    async fn put(&self, node: &NodeEndpoint, blob_id: Uuid, data: Bytes) -> Result<()> {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(&node.id) {
            Some(n) if n.online => {
                n.blobs.insert(blob_id, data);
                self.writes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            _ => Err(Self::unreachable(node)),
        }
    }

    async fn get(&self, node: &NodeEndpoint, blob_id: Uuid) -> Result<Bytes> {
        let nodes = self.nodes.read();
        match nodes.get(&node.id) {
            Some(n) if n.online => {
                self.reads.fetch_add(1, Ordering::Relaxed);
                n.blobs
                    .get(&blob_id)
                    .filter(|b| !b.is_empty())
                    .cloned()
                    .ok_or_else(|| {
                        VaultError::transport(&node.id, format!("blob {} not found", blob_id))
                    })
            }
            _ => Err(Self::unreachable(node)),
        }
    }

    async fn delete(&self, node: &NodeEndpoint, blob_id: Uuid) {
        let mut nodes = self.nodes.write();
        if let Some(n) = nodes.get_mut(&node.id).filter(|n| n.online) {
            n.blobs.remove(&blob_id);
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn health_probe(&self, node: &NodeEndpoint) -> bool {
        self.nodes
            .read()
            .get(&node.id)
            .map(|n| n.online)
            .unwrap_or(false)
    }
}
