//! Database models for ChunkVault metadata
//!
//! These structs map directly to PostgreSQL tables and are shared with the
//! in-memory store. Replicas are modelled flat: a chunk is the set of
//! [`ChunkPlacement`] rows sharing `(file_id, chunk_index)`, and
//! `(file_id, chunk_index, node_id)` is unique.

use chrono::{DateTime, Utc};
use chunkvault_core::NodeEndpoint;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// File lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum FileStatus {
    Uploading,
    Complete,
    Degraded,
}

impl FileStatus {
    /// Whether owners can see (list/download) a file in this state.
    pub fn is_visible(&self) -> bool {
        matches!(self, Self::Complete | Self::Degraded)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uploading => write!(f, "UPLOADING"),
            Self::Complete => write!(f, "COMPLETE"),
            Self::Degraded => write!(f, "DEGRADED"),
        }
    }
}

/// Node liveness as last observed by the health monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    Unknown,
    Up,
    Down,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// Owner of stored files
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Owner {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Owner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// File metadata
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub content_type: String,

    // Layout
    pub size_bytes: i64,
    pub chunk_count: i32,
    pub replication_factor: i32,

    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a new file record
#[derive(Debug, Clone)]
pub struct NewFile {
    pub owner_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub chunk_count: u32,
    pub replication_factor: u32,
}

impl FileRecord {
    /// A fresh record in the UPLOADING state.
    pub fn uploading(new: NewFile) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            filename: new.filename,
            content_type: new.content_type,
            size_bytes: new.size_bytes as i64,
            chunk_count: new.chunk_count as i32,
            replication_factor: new.replication_factor as i32,
            status: FileStatus::Uploading,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_count.max(0) as u32
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor.max(0) as usize
    }
}

/// Wrapped data-encryption key for a file
#[derive(Clone, FromRow, Serialize, Deserialize)]
pub struct EncryptedKeyRecord {
    pub file_id: Uuid,
    pub wrapped_dek: Vec<u8>,
    pub salt: Vec<u8>,
    /// Reserved; always empty today.
    pub iv: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl EncryptedKeyRecord {
    pub fn new(file_id: Uuid, wrapped_dek: Vec<u8>, salt: Vec<u8>) -> Self {
        Self {
            file_id,
            wrapped_dek,
            salt,
            iv: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for EncryptedKeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedKeyRecord")
            .field("file_id", &self.file_id)
            .field("wrapped_dek_len", &self.wrapped_dek.len())
            .field("salt_len", &self.salt.len())
            .finish()
    }
}

/// One replica of one chunk on one node
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ChunkPlacement {
    pub id: Uuid,
    pub file_id: Uuid,
    pub chunk_index: i32,
    pub node_id: String,
    /// Node-local blob handle
    pub blob_id: Uuid,
    /// SHA-256 hex of the encrypted bytes
    pub checksum: String,
    /// Encrypted size in bytes
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl ChunkPlacement {
    pub fn new(
        file_id: Uuid,
        chunk_index: u32,
        node_id: impl Into<String>,
        blob_id: Uuid,
        checksum: impl Into<String>,
        size_bytes: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_id,
            chunk_index: chunk_index as i32,
            node_id: node_id.into(),
            blob_id,
            checksum: checksum.into(),
            size_bytes: size_bytes as i64,
            created_at: Utc::now(),
        }
    }

    /// Grouping key shared by all replicas of a chunk.
    pub fn chunk_key(&self) -> (Uuid, i32) {
        (self.file_id, self.chunk_index)
    }
}

/// Storage node known to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub host: String,
    pub port: i32,
    pub status: NodeStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16, status: NodeStatus) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port: port as i32,
            status,
            last_heartbeat: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == NodeStatus::Up
    }

    pub fn endpoint(&self) -> NodeEndpoint {
        NodeEndpoint::new(
            self.id.clone(),
            self.host.clone(),
            u16::try_from(self.port).unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_matches_storage_format() {
        assert_eq!(FileStatus::Uploading.to_string(), "UPLOADING");
        assert_eq!(NodeStatus::Up.to_string(), "UP");
        assert_eq!(
            serde_json::to_string(&FileStatus::Degraded).unwrap(),
            "\"DEGRADED\""
        );
    }

    #[test]
    fn test_visibility() {
        assert!(!FileStatus::Uploading.is_visible());
        assert!(FileStatus::Complete.is_visible());
        assert!(FileStatus::Degraded.is_visible());
    }

    #[test]
    fn test_key_record_debug_hides_material() {
        let record = EncryptedKeyRecord::new(Uuid::new_v4(), vec![1, 2, 3], vec![4; 16]);
        let debug = format!("{:?}", record);
        assert!(debug.contains("wrapped_dek_len: 3"));
        assert!(!debug.contains("[1, 2, 3]"));
    }

    #[test]
    fn test_node_endpoint() {
        let node = NodeRecord::new("node-1", "10.0.0.5", 9001, NodeStatus::Unknown);
        let ep = node.endpoint();
        assert_eq!(ep.id, "node-1");
        assert_eq!(ep.port, 9001);
        assert!(!node.is_up());
    }
}
