//! Node Registry
//!
//! Registration and lookup of storage nodes. A node is probed once when it is
//! registered and stored as UP or UNKNOWN, never DOWN: a single failed probe
//! at startup is not enough evidence. Afterwards only the health monitor
//! changes a node's status.

use crate::config::NodeSpec;
use chrono::Utc;
use chunkvault_core::{NodeEndpoint, Result, VaultError};
use chunkvault_metadata::{MetadataStore, NodeRecord, NodeStatus};
use chunkvault_network::ChunkStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Node view returned by the admin API
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub status: NodeStatus,
    pub last_heartbeat: Option<chrono::DateTime<Utc>>,
}

impl From<NodeRecord> for NodeInfo {
    fn from(node: NodeRecord) -> Self {
        Self {
            port: u16::try_from(node.port).unwrap_or_default(),
            id: node.id,
            host: node.host,
            status: node.status,
            last_heartbeat: node.last_heartbeat,
        }
    }
}

/// Storage node registry
#[derive(Clone)]
pub struct NodeRegistry {
    store: Arc<dyn MetadataStore>,
    chunks: Arc<dyn ChunkStore>,
}

impl NodeRegistry {
    pub fn new(store: Arc<dyn MetadataStore>, chunks: Arc<dyn ChunkStore>) -> Self {
        Self { store, chunks }
    }

    /// Probe a would-be node and build its record.
    async fn probed_record(&self, id: &str, host: &str, port: u16) -> NodeRecord {
        let endpoint = NodeEndpoint::new(id, host, port);
        let healthy = self.chunks.health_probe(&endpoint).await;
        let status = if healthy {
            NodeStatus::Up
        } else {
            NodeStatus::Unknown
        };
        let mut record = NodeRecord::new(id, host, port, status);
        if healthy {
            record.last_heartbeat = Some(Utc::now());
        }
        record
    }

    /// Register the statically configured nodes, updating the address of
    /// nodes already known.
    pub async fn register_configured(&self, nodes: &[NodeSpec]) -> Result<Vec<NodeRecord>> {
        let mut registered = Vec::with_capacity(nodes.len());
        for spec in nodes {
            let record = self.probed_record(&spec.id, &spec.host, spec.port).await;
            let stored = self.store.upsert_node(&record).await?;
            info!(
                node_id = %stored.id,
                host = %stored.host,
                port = stored.port,
                status = %stored.status,
                "Configured node registered"
            );
            registered.push(stored);
        }
        Ok(registered)
    }

    /// Register a node at runtime. Fails with `Conflict` if the id is taken.
    pub async fn register(&self, id: &str, host: &str, port: u16) -> Result<NodeInfo> {
        let id = id.trim();
        let host = host.trim();
        if id.is_empty() || host.is_empty() {
            return Err(VaultError::InvalidInput(
                "node id and host are required".to_string(),
            ));
        }
        if port == 0 {
            return Err(VaultError::InvalidInput("node port must be non-zero".to_string()));
        }
        if self.store.get_node(id).await?.is_some() {
            return Err(VaultError::Conflict(format!("node {} already registered", id)));
        }

        let record = self.probed_record(id, host, port).await;
        self.store.insert_node(&record).await?;
        if record.is_up() {
            info!(node_id = %id, host = %host, port, "Node registered (UP)");
        } else {
            warn!(node_id = %id, host = %host, port, "Node registered but not reachable (UNKNOWN)");
        }
        Ok(record.into())
    }

    /// All nodes ordered by id
    pub async fn list(&self) -> Result<Vec<NodeInfo>> {
        Ok(self
            .store
            .list_nodes()
            .await?
            .into_iter()
            .map(NodeInfo::from)
            .collect())
    }

    /// Nodes currently UP, ordered by id
    pub async fn up_nodes(&self) -> Result<Vec<NodeRecord>> {
        Ok(self.store.list_nodes_by_status(NodeStatus::Up).await?)
    }
}
