//! ChunkVault Metadata Store
//!
//! Durable record of owners, files, wrapped keys, chunk placements and
//! storage nodes. Two backends implement [`MetadataStore`]:
//!
//! - [`PgMetadataStore`]: PostgreSQL via sqlx, with embedded migrations
//! - [`MemoryMetadataStore`]: guarded in-process tables for tests and single-process deployments
//!
//! [`FileLocks`] serialises uploads, deletes and repairs that touch the same file.

pub mod locks;
pub mod memory;
pub mod models;
pub mod postgres;

pub use locks::{FileGuard, FileLocks};
pub use memory::MemoryMetadataStore;
pub use models::*;
pub use postgres::{DbConfig, PgMetadataStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chunkvault_core::VaultError;
use thiserror::Error;
use uuid::Uuid;

/// Metadata store error types
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type Result<T> = std::result::Result<T, MetadataError>;

impl From<MetadataError> for VaultError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(what) => VaultError::NotFound(what),
            MetadataError::Conflict(what) => VaultError::Conflict(what),
            other => VaultError::Metadata(other.to_string()),
        }
    }
}

/// CRUD surface the orchestrator needs from its metadata store.
///
/// Implementations must enforce uniqueness of `(file_id, chunk_index, node_id)`
/// and cascade file deletion to the key record and all placements.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    // ===== Owners =====

    async fn insert_owner(&self, owner: &Owner) -> Result<()>;

    async fn get_owner(&self, id: Uuid) -> Result<Option<Owner>>;

    // ===== Files =====

    /// Persist a new file together with its wrapped key.
    async fn insert_file(&self, file: &FileRecord, key: &EncryptedKeyRecord) -> Result<()>;

    async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>>;

    /// Files of one owner, oldest first.
    async fn list_files_by_owner(&self, owner_id: Uuid) -> Result<Vec<FileRecord>>;

    async fn list_files(&self) -> Result<Vec<FileRecord>>;

    /// Fails with `NotFound` if the file does not exist.
    async fn set_file_status(&self, id: Uuid, status: FileStatus) -> Result<()>;

    /// Delete a file and everything hanging off it. Returns false if absent.
    async fn delete_file(&self, id: Uuid) -> Result<bool>;

    async fn get_encrypted_key(&self, file_id: Uuid) -> Result<Option<EncryptedKeyRecord>>;

    // ===== Chunk placements =====

    /// Fails with `Conflict` if the node already holds this chunk index,
    /// `NotFound` if the file is gone.
    async fn insert_placement(&self, placement: &ChunkPlacement) -> Result<()>;

    /// Placements of one file ordered by chunk index.
    async fn placements_for_file(&self, file_id: Uuid) -> Result<Vec<ChunkPlacement>>;

    async fn placements_for_chunk(&self, file_id: Uuid, chunk_index: i32) -> Result<Vec<ChunkPlacement>>;

    /// Every placement, ordered by `(file_id, chunk_index)`.
    async fn all_placements(&self) -> Result<Vec<ChunkPlacement>>;

    // ===== Nodes =====

    /// Fails with `Conflict` if the id is taken.
    async fn insert_node(&self, node: &NodeRecord) -> Result<()>;

    /// Insert or update address and status; keeps `created_at` of an existing row.
    async fn upsert_node(&self, node: &NodeRecord) -> Result<NodeRecord>;

    async fn get_node(&self, id: &str) -> Result<Option<NodeRecord>>;

    /// All nodes ordered by id.
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>>;

    /// Nodes in one status ordered by id.
    async fn list_nodes_by_status(&self, status: NodeStatus) -> Result<Vec<NodeRecord>>;

    /// Record a probe result. `heartbeat` of `None` leaves the previous value.
    async fn update_node_health(
        &self,
        id: &str,
        status: NodeStatus,
        heartbeat: Option<DateTime<Utc>>,
    ) -> Result<()>;
}
