//! ChunkVault Core Library
//!
//! Shared building blocks for the ChunkVault storage orchestrator.
//! This crate provides:
//! - Envelope encryption (PBKDF2-derived wrapping keys, AES-256-GCM data keys)
//! - Fixed-size chunking and SHA-256 checksums over encrypted chunks
//! - Storage node addressing
//! - The error taxonomy shared by every other crate

pub mod chunk;
pub mod crypto;
pub mod endpoint;
pub mod error;

pub use chunk::{checksum_hex, chunk_count, split_into_chunks, verify_checksum};
pub use crypto::{EncryptionKey, EnvelopeCrypto, Password};
pub use endpoint::NodeEndpoint;
pub use error::{Result, VaultError};

/// Plaintext chunk size used when none is configured (4 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Target number of healthy replicas per chunk when none is configured
pub const DEFAULT_REPLICATION_FACTOR: u32 = 3;

/// PBKDF2 iteration count used when none is configured
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Lowest PBKDF2 iteration count accepted by production configuration
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;
