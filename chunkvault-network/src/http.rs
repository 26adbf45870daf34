//! HTTP chunk store client
//!
//! One pooled `reqwest::Client` shared across all nodes. Every call is
//! bounded by the connect and request timeouts, so an unresponsive node
//! costs at most `request_timeout` per attempt.

use crate::{ChunkStore, PutBlobResponse};
use async_trait::async_trait;
use bytes::Bytes;
use chunkvault_core::{NodeEndpoint, Result, VaultError};
use reqwest::{header, Client};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Configuration for the node client
#[derive(Debug, Clone)]
pub struct NodeClientConfig {
    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Whole-request timeout, body included
    pub request_timeout: Duration,

    /// Timeout for health probes
    pub probe_timeout: Duration,
}

impl Default for NodeClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

/// [`ChunkStore`] over the node HTTP API
#[derive(Clone)]
pub struct HttpChunkStore {
    client: Client,
    config: NodeClientConfig,
}

impl HttpChunkStore {
    pub fn new(config: NodeClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| VaultError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &NodeClientConfig {
        &self.config
    }

    fn blob_url(node: &NodeEndpoint, blob_id: Uuid) -> String {
        format!("{}/chunks/{}", node.base_url(), blob_id)
    }

    fn health_url(node: &NodeEndpoint) -> String {
        format!("{}/chunks/health", node.base_url())
    }
}

#[async_trait]
impl ChunkStore for HttpChunkStore {
    async fn put(&self, node: &NodeEndpoint, blob_id: Uuid, data: Bytes) -> Result<()> {
        let size = data.len();
        let response = self
            .client
            .put(Self::blob_url(node, blob_id))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| VaultError::transport(&node.id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VaultError::transport(
                &node.id,
                format!("PUT {} returned {}", blob_id, status),
            ));
        }

        let reply: PutBlobResponse = response
            .json()
            .await
            .map_err(|e| VaultError::transport(&node.id, e))?;
        if reply.size != size as u64 {
            return Err(VaultError::transport(
                &node.id,
                format!("PUT {} stored {} of {} bytes", blob_id, reply.size, size),
            ));
        }

        debug!(node_id = %node.id, blob_id = %blob_id, size, "Blob stored");
        Ok(())
    }

    async fn get(&self, node: &NodeEndpoint, blob_id: Uuid) -> Result<Bytes> {
        let response = self
            .client
            .get(Self::blob_url(node, blob_id))
            .send()
            .await
            .map_err(|e| VaultError::transport(&node.id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VaultError::transport(
                &node.id,
                format!("GET {} returned {}", blob_id, status),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| VaultError::transport(&node.id, e))?;
        if body.is_empty() {
            return Err(VaultError::transport(
                &node.id,
                format!("GET {} returned an empty body", blob_id),
            ));
        }

        Ok(body)
    }

    async fn delete(&self, node: &NodeEndpoint, blob_id: Uuid) {
        match self.client.delete(Self::blob_url(node, blob_id)).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(node_id = %node.id, blob_id = %blob_id, "Blob deleted");
            }
            Ok(response) => {
                warn!(
                    node_id = %node.id,
                    blob_id = %blob_id,
                    status = %response.status(),
                    "Blob delete rejected"
                );
            }
            Err(e) => {
                warn!(node_id = %node.id, blob_id = %blob_id, error = %e, "Blob delete failed");
            }
        }
    }

    async fn health_probe(&self, node: &NodeEndpoint) -> bool {
        match self
            .client
            .get(Self::health_url(node))
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(node_id = %node.id, error = %e, "Health probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::routing::put;
    use axum::{Json, Router};

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    /// A node that acknowledges every PUT but reports `short_by` fewer bytes
    async fn spawn_node(short_by: u64) -> NodeEndpoint {
        let app = Router::new().route(
            "/chunks/:blob_id",
            put(move |Path(blob_id): Path<String>, body: Bytes| async move {
                Json(PutBlobResponse {
                    blob_id,
                    node_id: "fake".into(),
                    size: body.len() as u64 - short_by,
                })
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        NodeEndpoint::new("fake", "127.0.0.1", port)
    }

    #[test]
    fn test_urls() {
        let node = NodeEndpoint::new("node-1", "localhost", 9001);
        let blob = Uuid::nil();
        assert_eq!(
            HttpChunkStore::blob_url(&node, blob),
            "http://localhost:9001/chunks/00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            HttpChunkStore::health_url(&node),
            "http://localhost:9001/chunks/health"
        );
    }

    #[test]
    fn test_default_timeouts() {
        let config = NodeClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let store = HttpChunkStore::new(NodeClientConfig::default()).unwrap();
        let node = NodeEndpoint::new("ghost", "127.0.0.1", free_port());

        assert!(!store.health_probe(&node).await);

        let err = store
            .put(&node, Uuid::new_v4(), Bytes::from_static(b"data"))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::StorageTransport { ref node, .. } if node == "ghost"));

        let err = store.get(&node, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, VaultError::StorageTransport { .. }));

        // Never raises
        store.delete(&node, Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn test_put_checks_acknowledged_size() {
        let store = HttpChunkStore::new(NodeClientConfig::default()).unwrap();

        let honest = spawn_node(0).await;
        store
            .put(&honest, Uuid::new_v4(), Bytes::from_static(b"whole blob"))
            .await
            .unwrap();

        let short = spawn_node(3).await;
        let err = store
            .put(&short, Uuid::new_v4(), Bytes::from_static(b"whole blob"))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::StorageTransport { ref node, .. } if node == "fake"));
    }
}
