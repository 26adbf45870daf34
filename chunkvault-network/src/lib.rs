//! ChunkVault Network Layer
//!
//! Talks to storage nodes over their chunk API:
//!
//! ```text
//! PUT    /chunks/{blobId}   raw bytes  -> 200 {blobId, nodeId, size}
//! GET    /chunks/{blobId}              -> raw bytes | 404
//! DELETE /chunks/{blobId}              -> 204
//! GET    /chunks/health                -> {nodeId, status, totalChunks, dataDir, timestamp}
//! ```
//!
//! [`ChunkStore`] is the seam the orchestrator depends on. [`HttpChunkStore`]
//! is the production implementation; [`MemoryNodeCluster`] simulates a set of
//! nodes in-process for tests.

pub mod http;
pub mod memory;
pub mod wire;

pub use http::{HttpChunkStore, NodeClientConfig};
pub use memory::MemoryNodeCluster;
pub use wire::{NodeHealthResponse, PutBlobResponse};

use async_trait::async_trait;
use bytes::Bytes;
use chunkvault_core::{NodeEndpoint, Result};
use uuid::Uuid;

/// Blob operations against a single storage node.
///
/// Implementations perform no retries. Callers decide what a failure means.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store `data` under `blob_id`, overwriting any previous blob.
    /// Transport failures and non-2xx responses are `StorageTransport` errors.
    async fn put(&self, node: &NodeEndpoint, blob_id: Uuid, data: Bytes) -> Result<()>;

    /// Fetch a blob. A missing blob, an empty body or a transport failure is
    /// a `StorageTransport` error.
    async fn get(&self, node: &NodeEndpoint, blob_id: Uuid) -> Result<Bytes>;

    /// Best-effort removal. Failures are logged, never returned.
    async fn delete(&self, node: &NodeEndpoint, blob_id: Uuid);

    /// Reachability check. Any failure counts as unhealthy.
    async fn health_probe(&self, node: &NodeEndpoint) -> bool;
}
