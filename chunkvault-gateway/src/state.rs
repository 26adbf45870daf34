//! Application State
//!
//! Shared state for all gateway components, and the file/admin operations
//! that sit beside the upload and download pipelines:
//! owners, listing, deletion, chunk maps, node admin and manual repair.

use crate::config::GatewayConfig;
use crate::metrics;
use crate::registry::{NodeInfo, NodeRegistry};
use crate::selector::NodeSelector;
use chrono::{DateTime, Utc};
use chunkvault_core::{EnvelopeCrypto, Result, VaultError};
use chunkvault_metadata::{
    ChunkPlacement, FileLocks, FileRecord, FileStatus, MetadataStore, NodeRecord, NodeStatus,
    Owner,
};
use chunkvault_network::ChunkStore;
use chunkvault_rebalancer::{RepairLoop, RepairReport};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// File metadata as shown to its owner
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub chunk_count: u32,
    pub replication_factor: u32,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
}

impl From<FileRecord> for FileSummary {
    fn from(file: FileRecord) -> Self {
        Self {
            id: file.id,
            size_bytes: file.size_bytes.max(0) as u64,
            chunk_count: file.chunk_count(),
            replication_factor: file.replication_factor() as u32,
            filename: file.filename,
            content_type: file.content_type,
            status: file.status,
            created_at: file.created_at,
        }
    }
}

/// Per-chunk replica breakdown of one file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMap {
    pub file_id: Uuid,
    pub filename: String,
    pub status: FileStatus,
    pub total_chunks: u32,
    pub replication_factor: u32,
    pub chunks: Vec<ChunkEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEntry {
    pub chunk_index: u32,
    pub healthy_replicas: usize,
    pub replicas: Vec<ReplicaEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaEntry {
    pub node_id: String,
    pub blob_id: Uuid,
    pub checksum: String,
    pub size: u64,
    pub node_status: NodeStatus,
}

/// Application state shared across all handlers and background tasks
pub struct AppState {
    pub(crate) store: Arc<dyn MetadataStore>,
    pub(crate) chunks: Arc<dyn ChunkStore>,
    pub(crate) crypto: EnvelopeCrypto,
    pub(crate) locks: Arc<FileLocks>,
    pub(crate) selector: NodeSelector,
    pub(crate) registry: NodeRegistry,
    pub(crate) repair: RepairLoop,
    pub(crate) chunk_size: usize,
    pub(crate) replication_factor: u32,
}

impl AppState {
    /// Build the state from configuration and the two storage seams.
    ///
    /// The configuration is not validated here; callers loading it from
    /// outside do that first.
    pub fn new(
        config: &GatewayConfig,
        store: Arc<dyn MetadataStore>,
        chunks: Arc<dyn ChunkStore>,
    ) -> Result<Self> {
        if config.storage.chunk_size == 0 || config.storage.replication_factor == 0 {
            return Err(VaultError::Configuration(
                "chunk size and replication factor must be non-zero".to_string(),
            ));
        }

        let locks = Arc::new(FileLocks::new());
        let repair = RepairLoop::new(
            store.clone(),
            chunks.clone(),
            locks.clone(),
            config.rebalancer_config(),
        );

        Ok(Self {
            crypto: EnvelopeCrypto::new(config.storage.pbkdf2_iterations)?,
            registry: NodeRegistry::new(store.clone(), chunks.clone()),
            selector: NodeSelector::new(),
            chunk_size: config.storage.chunk_size,
            replication_factor: config.storage.replication_factor,
            store,
            chunks,
            locks,
            repair,
        })
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub fn chunk_store(&self) -> &Arc<dyn ChunkStore> {
        &self.chunks
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn locks(&self) -> &Arc<FileLocks> {
        &self.locks
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    // ===== Owners =====

    pub async fn register_owner(&self, name: &str) -> Result<Owner> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::InvalidInput("owner name is required".to_string()));
        }
        let owner = Owner::new(name);
        self.store.insert_owner(&owner).await?;
        info!(owner_id = %owner.id, name = %owner.name, "Owner registered");
        Ok(owner)
    }

    pub(crate) async fn require_owner(&self, owner_id: Uuid) -> Result<Owner> {
        self.store
            .get_owner(owner_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("owner {}", owner_id)))
    }

    /// Load a file and check that `owner_id` owns it.
    pub(crate) async fn owned_file(&self, file_id: Uuid, owner_id: Uuid) -> Result<FileRecord> {
        let file = self
            .store
            .get_file(file_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("file {}", file_id)))?;
        if file.owner_id != owner_id {
            return Err(VaultError::Unauthorized(format!(
                "file {} belongs to another owner",
                file_id
            )));
        }
        Ok(file)
    }

    // ===== Files =====

    /// COMPLETE and DEGRADED files of one owner, oldest first.
    pub async fn list_files(&self, owner_id: Uuid) -> Result<Vec<FileSummary>> {
        self.require_owner(owner_id).await?;
        Ok(self
            .store
            .list_files_by_owner(owner_id)
            .await?
            .into_iter()
            .filter(|f| f.status.is_visible())
            .map(FileSummary::from)
            .collect())
    }

    /// Delete a file, its key and every replica.
    ///
    /// Replica blobs are removed best-effort; the metadata is removed regardless.
    #[instrument(skip(self))]
    pub async fn delete_file(&self, file_id: Uuid, owner_id: Uuid) -> Result<()> {
        self.require_owner(owner_id).await?;
        let _guard = self.locks.lock(file_id).await;
        let file = self.owned_file(file_id, owner_id).await?;

        let placements = self.store.placements_for_file(file_id).await?;
        let nodes = self.node_map().await?;
        let deletes = placements.iter().filter_map(|p| {
            let node = nodes.get(&p.node_id)?;
            let endpoint = node.endpoint();
            let blob_id = p.blob_id;
            Some(async move { self.chunks.delete(&endpoint, blob_id).await })
        });
        join_all(deletes).await;

        self.store.delete_file(file_id).await?;
        info!(
            %file_id,
            filename = %file.filename,
            replicas = placements.len(),
            "File deleted"
        );
        Ok(())
    }

    /// Replica layout of a file with each node's current status.
    pub async fn chunk_map(&self, file_id: Uuid) -> Result<ChunkMap> {
        let file = self
            .store
            .get_file(file_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("file {}", file_id)))?;
        let nodes = self.node_map().await?;

        let mut groups: BTreeMap<i32, Vec<ChunkPlacement>> = BTreeMap::new();
        for placement in self.store.placements_for_file(file_id).await? {
            groups.entry(placement.chunk_index).or_default().push(placement);
        }

        let total_chunks = file.chunk_count();
        let chunks = (0..total_chunks)
            .map(|index| {
                let replicas: Vec<ReplicaEntry> = groups
                    .remove(&(index as i32))
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| ReplicaEntry {
                        node_status: nodes
                            .get(&p.node_id)
                            .map(|n| n.status)
                            .unwrap_or_default(),
                        node_id: p.node_id,
                        blob_id: p.blob_id,
                        checksum: p.checksum,
                        size: p.size_bytes.max(0) as u64,
                    })
                    .collect();
                ChunkEntry {
                    chunk_index: index,
                    healthy_replicas: replicas
                        .iter()
                        .filter(|r| r.node_status == NodeStatus::Up)
                        .count(),
                    replicas,
                }
            })
            .collect();

        Ok(ChunkMap {
            file_id,
            replication_factor: file.replication_factor() as u32,
            filename: file.filename,
            status: file.status,
            total_chunks,
            chunks,
        })
    }

    // ===== Nodes =====

    pub(crate) async fn node_map(&self) -> Result<HashMap<String, NodeRecord>> {
        Ok(self
            .store
            .list_nodes()
            .await?
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect())
    }

    pub async fn register_node(&self, id: &str, host: &str, port: u16) -> Result<NodeInfo> {
        self.registry.register(id, host, port).await
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        self.registry.list().await
    }

    // ===== Repair =====

    /// Run one repair cycle now, after any cycle already in progress.
    pub async fn trigger_repair(&self) -> Result<RepairReport> {
        let report = self.repair.run_cycle().await.inspect_err(|e| {
            warn!(error = %e, "Repair cycle failed");
        })?;
        metrics::record_repair(&report);
        Ok(report)
    }

    pub fn repair_loop(&self) -> &RepairLoop {
        &self.repair
    }
}
