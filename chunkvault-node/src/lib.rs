//! ChunkVault Storage Node Library
//!
//! A storage node keeps encrypted chunk blobs on local disk and serves them
//! over a small HTTP API. It never sees plaintext or keys.
//! - Configuration management
//! - File-per-blob storage
//! - Chunk HTTP API
//! - Prometheus metrics

pub mod api;
pub mod config;
pub mod metrics;
pub mod store;

pub use api::{router, NodeState};
pub use config::{ConfigError, NodeConfig, NodeIdentity, ServerSettings, StorageSettings};
pub use metrics::{install_recorder, NodeMetrics};
pub use store::{validate_blob_id, BlobStore, StoreError};
