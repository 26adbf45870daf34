//! Error types for ChunkVault
//!
//! One taxonomy for the whole orchestrator. Node I/O, metadata and crypto
//! failures are all folded into [`VaultError`] so `?` works across crates.

use thiserror::Error;

/// Result type alias for ChunkVault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Unified error type for ChunkVault
#[derive(Error, Debug)]
pub enum VaultError {
    // ===== Domain Errors =====
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not enough healthy nodes: need {required}, found {available}")]
    InsufficientNodes { available: usize, required: usize },

    #[error("Storage transport error on node {node}: {reason}")]
    StorageTransport { node: String, reason: String },

    #[error("All replicas failed for chunk {chunk_index} ({attempts} attempted)")]
    ReplicaExhausted { chunk_index: u32, attempts: usize },

    #[error("Bad request: {0}")]
    InvalidInput(String),

    // ===== Cryptography Errors =====
    /// AEAD tag verification failed: wrong key or corrupted data.
    #[error("Authentication failed: wrong key or corrupted data")]
    Authentication,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    // ===== Infrastructure Errors =====
    #[error("Metadata store error: {0}")]
    Metadata(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Shorthand for a node I/O failure.
    pub fn transport(node: impl Into<String>, reason: impl ToString) -> Self {
        VaultError::StorageTransport {
            node: node.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable machine-readable kind, used in API error bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::NotFound(_) => "not_found",
            VaultError::Unauthorized(_) => "unauthorized",
            VaultError::Conflict(_) => "conflict",
            VaultError::InsufficientNodes { .. } => "insufficient_nodes",
            VaultError::StorageTransport { .. } => "storage_transport",
            VaultError::ReplicaExhausted { .. } => "replica_exhausted",
            VaultError::InvalidInput(_) => "invalid_input",
            VaultError::Authentication => "authentication",
            VaultError::Encryption(_) => "encryption",
            VaultError::KeyDerivation(_) => "key_derivation",
            VaultError::InvalidKeyLength { .. } => "invalid_key_length",
            VaultError::Metadata(_) => "metadata",
            VaultError::Configuration(_) => "configuration",
            VaultError::Io(_) => "io",
            VaultError::Internal(_) => "internal",
        }
    }
}
