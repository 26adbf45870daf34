//! Upload Pipeline
//!
//! 1. Generate a data key, wrap it under a password-derived key, persist the
//!    file as UPLOADING together with the wrapped key
//! 2. Split the plaintext into fixed-size chunks
//! 3. Per chunk: encrypt, checksum the ciphertext, pick nodes, write one blob
//!    id to every node in parallel, record a placement per successful write
//! 4. Mark the file COMPLETE
//!
//! A failure after step 1 rolls back: written blobs are deleted best-effort
//! and the file record is removed.

use crate::metrics;
use crate::state::AppState;
use bytes::Bytes;
use chunkvault_core::{
    checksum_hex, chunk_count, split_into_chunks, EncryptionKey, NodeEndpoint, Password, Result,
    VaultError,
};
use chunkvault_metadata::{ChunkPlacement, EncryptedKeyRecord, FileRecord, FileStatus, NewFile};
use futures::future::join_all;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Filename recorded when the caller supplies none
pub const DEFAULT_FILENAME: &str = "upload";

/// Content type recorded when the caller supplies none
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Upload input
pub struct UploadRequest {
    pub owner_id: Uuid,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub password: Password,
    pub data: Bytes,
}

/// Upload result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub file_id: Uuid,
    pub filename: String,
    pub chunk_count: u32,
    pub replicas_per_chunk: u32,
}

fn non_blank(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl AppState {
    /// Store a file. See the module docs for the steps.
    #[instrument(skip(self, request), fields(owner_id = %request.owner_id, size = request.data.len()))]
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt> {
        let started = Instant::now();
        let size = request.data.len() as u64;

        let result = self.upload_file(request).await;
        match &result {
            Ok(receipt) => {
                metrics::record_upload("ok", size, started.elapsed());
                info!(
                    file_id = %receipt.file_id,
                    filename = %receipt.filename,
                    chunks = receipt.chunk_count,
                    replicas = receipt.replicas_per_chunk,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Upload complete"
                );
            }
            Err(e) => {
                metrics::record_upload(e.kind(), size, started.elapsed());
                warn!(error = %e, "Upload failed");
            }
        }
        result
    }

    async fn upload_file(&self, request: UploadRequest) -> Result<UploadReceipt> {
        let UploadRequest {
            owner_id,
            filename,
            content_type,
            password,
            data,
        } = request;

        self.require_owner(owner_id).await?;

        let filename = non_blank(filename, DEFAULT_FILENAME);
        let content_type = non_blank(content_type, DEFAULT_CONTENT_TYPE);
        let chunks = chunk_count(data.len() as u64, self.chunk_size);

        // Key material first; nothing touches a node until this succeeds
        let crypto = self.crypto;
        let data_key = crypto.generate_data_key();
        let salt = crypto.generate_salt();
        let wrapping_key = tokio::task::spawn_blocking(move || {
            crypto.derive_wrapping_key(&password, &salt)
        })
        .await
        .map_err(|e| VaultError::Internal(format!("key derivation task: {}", e)))??;
        let wrapped = crypto.wrap_key(&data_key, &wrapping_key)?;

        let file = FileRecord::uploading(NewFile {
            owner_id,
            filename,
            content_type,
            size_bytes: data.len() as u64,
            chunk_count: chunks,
            replication_factor: self.replication_factor,
        });
        // Held from the moment the record is visible until it is COMPLETE
        let _guard = self.locks.lock(file.id).await;
        self.store
            .insert_file(&file, &EncryptedKeyRecord::new(file.id, wrapped, salt.to_vec()))
            .await?;

        let mut written = Vec::new();
        if let Err(e) = self.write_chunks(&file, &data_key, &data, &mut written).await {
            self.roll_back(&file, &written).await;
            return Err(e);
        }
        if let Err(e) = self.store.set_file_status(file.id, FileStatus::Complete).await {
            self.roll_back(&file, &written).await;
            return Err(e.into());
        }

        Ok(UploadReceipt {
            file_id: file.id,
            filename: file.filename,
            chunk_count: chunks,
            replicas_per_chunk: self.replication_factor,
        })
    }

    /// Encrypt and place every chunk. Each stored blob is pushed to `written`
    /// as soon as its node accepts it.
    async fn write_chunks(
        &self,
        file: &FileRecord,
        data_key: &EncryptionKey,
        data: &Bytes,
        written: &mut Vec<(NodeEndpoint, Uuid)>,
    ) -> Result<()> {
        let wanted = file.replication_factor();

        for (index, plaintext) in split_into_chunks(data, self.chunk_size).into_iter().enumerate() {
            let sealed = Bytes::from(self.crypto.encrypt(&plaintext, data_key)?);
            let checksum = checksum_hex(&sealed);

            let up = self.registry.up_nodes().await?;
            let targets = match self.selector.select(&up, wanted) {
                Ok(targets) => targets,
                Err(VaultError::InsufficientNodes { available, required }) if available > 0 => {
                    warn!(
                        chunk_index = index,
                        available,
                        required,
                        "Not enough UP nodes, writing fewer replicas"
                    );
                    up
                }
                Err(e) => return Err(e),
            };

            let blob_id = Uuid::new_v4();
            let endpoints: Vec<NodeEndpoint> = targets.iter().map(|n| n.endpoint()).collect();
            let puts = endpoints
                .iter()
                .map(|node| self.chunks.put(node, blob_id, sealed.clone()));
            let outcomes = join_all(puts).await;

            let mut stored = 0;
            for (node, outcome) in endpoints.into_iter().zip(outcomes) {
                if let Err(e) = outcome {
                    metrics::record_replica_write_failure(&node.id);
                    warn!(node_id = %node.id, chunk_index = index, error = %e, "Replica write failed");
                    continue;
                }
                let placement = ChunkPlacement::new(
                    file.id,
                    index as u32,
                    node.id.clone(),
                    blob_id,
                    checksum.clone(),
                    sealed.len(),
                );
                written.push((node, blob_id));
                self.store.insert_placement(&placement).await?;
                stored += 1;
            }

            if stored == 0 {
                return Err(VaultError::transport(
                    "all",
                    format!("no replica of chunk {} could be written", index),
                ));
            }
            debug!(file_id = %file.id, chunk_index = index, replicas = stored, "Chunk placed");
        }
        Ok(())
    }

    async fn roll_back(&self, file: &FileRecord, written: &[(NodeEndpoint, Uuid)]) {
        join_all(
            written
                .iter()
                .map(|(node, blob_id)| self.chunks.delete(node, *blob_id)),
        )
        .await;
        if let Err(e) = self.store.delete_file(file.id).await {
            warn!(file_id = %file.id, error = %e, "Failed to remove record of failed upload");
        }
        warn!(
            file_id = %file.id,
            blobs = written.len(),
            "Upload rolled back"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_blank_fields() {
        assert_eq!(non_blank(None, DEFAULT_FILENAME), "upload");
        assert_eq!(non_blank(Some("  ".into()), DEFAULT_FILENAME), "upload");
        assert_eq!(non_blank(Some(" a.txt ".into()), DEFAULT_FILENAME), "a.txt");
    }
}
