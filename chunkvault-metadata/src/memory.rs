//! In-memory metadata store
//!
//! All tables sit behind one `RwLock`, so every operation is atomic with
//! respect to the others. Used for testing and single-process deployments.

use crate::models::*;
use crate::{MetadataError, MetadataStore, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

type PlacementKey = (Uuid, i32, String);

#[derive(Default)]
struct Tables {
    owners: HashMap<Uuid, Owner>,
    files: HashMap<Uuid, FileRecord>,
    keys: HashMap<Uuid, EncryptedKeyRecord>,
    /// Keyed by `(file_id, chunk_index, node_id)`
    placements: BTreeMap<PlacementKey, ChunkPlacement>,
    nodes: BTreeMap<String, NodeRecord>,
}

/// Metadata store backed by process memory
#[derive(Default)]
pub struct MemoryMetadataStore {
    tables: RwLock<Tables>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of placement rows (test helper)
    pub fn placement_count(&self) -> usize {
        self.tables.read().placements.len()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert_owner(&self, owner: &Owner) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.owners.contains_key(&owner.id) {
            return Err(MetadataError::Conflict(format!("owner {}", owner.id)));
        }
        tables.owners.insert(owner.id, owner.clone());
        Ok(())
    }

    async fn get_owner(&self, id: Uuid) -> Result<Option<Owner>> {
        Ok(self.tables.read().owners.get(&id).cloned())
    }

    async fn insert_file(&self, file: &FileRecord, key: &EncryptedKeyRecord) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.owners.contains_key(&file.owner_id) {
            return Err(MetadataError::NotFound(format!("owner {}", file.owner_id)));
        }
        if tables.files.contains_key(&file.id) {
            return Err(MetadataError::Conflict(format!("file {}", file.id)));
        }
        tables.files.insert(file.id, file.clone());
        tables.keys.insert(file.id, key.clone());
        Ok(())
    }

    async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>> {
        Ok(self.tables.read().files.get(&id).cloned())
    }

    async fn list_files_by_owner(&self, owner_id: Uuid) -> Result<Vec<FileRecord>> {
        let tables = self.tables.read();
        let mut files: Vec<FileRecord> = tables
            .files
            .values()
            .filter(|f| f.owner_id == owner_id)
            .cloned()
            .collect();
        files.sort_by_key(|f| (f.created_at, f.id));
        Ok(files)
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>> {
        let tables = self.tables.read();
        let mut files: Vec<FileRecord> = tables.files.values().cloned().collect();
        files.sort_by_key(|f| (f.created_at, f.id));
        Ok(files)
    }

    async fn set_file_status(&self, id: Uuid, status: FileStatus) -> Result<()> {
        let mut tables = self.tables.write();
        let file = tables
            .files
            .get_mut(&id)
            .ok_or_else(|| MetadataError::NotFound(format!("file {}", id)))?;
        file.status = status;
        file.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_file(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write();
        if tables.files.remove(&id).is_none() {
            return Ok(false);
        }
        tables.keys.remove(&id);
        tables.placements.retain(|(file_id, _, _), _| *file_id != id);
        Ok(true)
    }

    async fn get_encrypted_key(&self, file_id: Uuid) -> Result<Option<EncryptedKeyRecord>> {
        Ok(self.tables.read().keys.get(&file_id).cloned())
    }

    async fn insert_placement(&self, placement: &ChunkPlacement) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.files.contains_key(&placement.file_id) {
            return Err(MetadataError::NotFound(format!("file {}", placement.file_id)));
        }
        let key = (
            placement.file_id,
            placement.chunk_index,
            placement.node_id.clone(),
        );
        if tables.placements.contains_key(&key) {
            return Err(MetadataError::Conflict(format!(
                "chunk {} of file {} already on node {}",
                placement.chunk_index, placement.file_id, placement.node_id
            )));
        }
        tables.placements.insert(key, placement.clone());
        Ok(())
    }

    async fn placements_for_file(&self, file_id: Uuid) -> Result<Vec<ChunkPlacement>> {
        let tables = self.tables.read();
        Ok(tables
            .placements
            .range((file_id, i32::MIN, String::new())..)
            .take_while(|((fid, _, _), _)| *fid == file_id)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn placements_for_chunk(&self, file_id: Uuid, chunk_index: i32) -> Result<Vec<ChunkPlacement>> {
        let tables = self.tables.read();
        Ok(tables
            .placements
            .range((file_id, chunk_index, String::new())..)
            .take_while(|((fid, idx, _), _)| *fid == file_id && *idx == chunk_index)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn all_placements(&self) -> Result<Vec<ChunkPlacement>> {
        Ok(self.tables.read().placements.values().cloned().collect())
    }

    async fn insert_node(&self, node: &NodeRecord) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.nodes.contains_key(&node.id) {
            return Err(MetadataError::Conflict(format!("node {}", node.id)));
        }
        tables.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn upsert_node(&self, node: &NodeRecord) -> Result<NodeRecord> {
        let mut tables = self.tables.write();
        let stored = tables
            .nodes
            .entry(node.id.clone())
            .and_modify(|existing| {
                existing.host = node.host.clone();
                existing.port = node.port;
                existing.status = node.status;
                if node.last_heartbeat.is_some() {
                    existing.last_heartbeat = node.last_heartbeat;
                }
            })
            .or_insert_with(|| node.clone());
        Ok(stored.clone())
    }

    async fn get_node(&self, id: &str) -> Result<Option<NodeRecord>> {
        Ok(self.tables.read().nodes.get(id).cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        Ok(self.tables.read().nodes.values().cloned().collect())
    }

    async fn list_nodes_by_status(&self, status: NodeStatus) -> Result<Vec<NodeRecord>> {
        Ok(self
            .tables
            .read()
            .nodes
            .values()
            .filter(|n| n.status == status)
            .cloned()
            .collect())
    }

    async fn update_node_health(
        &self,
        id: &str,
        status: NodeStatus,
        heartbeat: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        let node = tables
            .nodes
            .get_mut(id)
            .ok_or_else(|| MetadataError::NotFound(format!("node {}", id)))?;
        node.status = status;
        if heartbeat.is_some() {
            node.last_heartbeat = heartbeat;
        }
        Ok(())
    }
}
