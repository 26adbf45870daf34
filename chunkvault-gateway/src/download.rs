//! Download Pipeline
//!
//! Rebuilds a file from its replicas. For each chunk index the replicas are
//! tried UP nodes first, then UNKNOWN, then DOWN; the first one that both
//! downloads and decrypts wins. A chunk with no working replica fails the
//! whole download with `ReplicaExhausted`.

use crate::metrics;
use crate::state::AppState;
use bytes::{Bytes, BytesMut};
use chunkvault_core::{EncryptionKey, Password, Result, VaultError};
use chunkvault_metadata::{ChunkPlacement, NodeRecord, NodeStatus};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A reassembled file
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub file_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Lower sorts first
fn replica_rank(status: NodeStatus) -> u8 {
    match status {
        NodeStatus::Up => 0,
        NodeStatus::Unknown => 1,
        NodeStatus::Down => 2,
    }
}

/// Replicas with a known node, best first. Stable within a rank.
fn order_replicas<'a>(
    replicas: Vec<ChunkPlacement>,
    nodes: &'a HashMap<String, NodeRecord>,
) -> Vec<(ChunkPlacement, &'a NodeRecord)> {
    let mut ordered: Vec<_> = replicas
        .into_iter()
        .filter_map(|p| {
            let node = nodes.get(&p.node_id)?;
            Some((p, node))
        })
        .collect();
    ordered.sort_by_key(|(_, node)| replica_rank(node.status));
    ordered
}

impl AppState {
    /// Download and decrypt a file owned by `owner_id`.
    #[instrument(skip(self, password))]
    pub async fn download(
        &self,
        file_id: Uuid,
        owner_id: Uuid,
        password: Password,
    ) -> Result<DownloadedFile> {
        let started = Instant::now();
        let result = self.download_file(file_id, owner_id, password).await;
        match &result {
            Ok(file) => {
                metrics::record_download("ok", file.data.len() as u64, started.elapsed());
                info!(
                    %file_id,
                    size = file.data.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Download complete"
                );
            }
            Err(e) => {
                metrics::record_download(e.kind(), 0, started.elapsed());
                warn!(%file_id, error = %e, "Download failed");
            }
        }
        result
    }

    async fn download_file(
        &self,
        file_id: Uuid,
        owner_id: Uuid,
        password: Password,
    ) -> Result<DownloadedFile> {
        self.require_owner(owner_id).await?;
        let file = self.owned_file(file_id, owner_id).await?;
        if !file.status.is_visible() {
            return Err(VaultError::NotFound(format!("file {}", file_id)));
        }

        let data_key = self.unwrap_data_key(file_id, password).await?;

        let mut groups: BTreeMap<i32, Vec<ChunkPlacement>> = BTreeMap::new();
        for placement in self.store.placements_for_file(file_id).await? {
            groups.entry(placement.chunk_index).or_default().push(placement);
        }
        let nodes = self.node_map().await?;

        let mut out = BytesMut::with_capacity(file.size_bytes.max(0) as usize);
        for index in 0..file.chunk_count() {
            let replicas = groups.remove(&(index as i32)).unwrap_or_default();
            let plaintext = self
                .read_chunk(index, order_replicas(replicas, &nodes), &data_key)
                .await?;
            out.extend_from_slice(&plaintext);
        }

        Ok(DownloadedFile {
            file_id,
            filename: file.filename,
            content_type: file.content_type,
            data: out.freeze(),
        })
    }

    /// Re-derive the wrapping key and open the stored data key. A tag failure
    /// here means the password is wrong.
    async fn unwrap_data_key(&self, file_id: Uuid, password: Password) -> Result<EncryptionKey> {
        let key = self
            .store
            .get_encrypted_key(file_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("key for file {}", file_id)))?;

        let crypto = self.crypto;
        let salt = key.salt.clone();
        let wrapping_key =
            tokio::task::spawn_blocking(move || crypto.derive_wrapping_key(&password, &salt))
                .await
                .map_err(|e| VaultError::Internal(format!("key derivation task: {}", e)))??;

        crypto
            .unwrap_key(&key.wrapped_dek, &wrapping_key)
            .map_err(|e| match e {
                VaultError::Authentication => VaultError::Unauthorized("invalid password".to_string()),
                other => other,
            })
    }

    async fn read_chunk(
        &self,
        index: u32,
        replicas: Vec<(ChunkPlacement, &NodeRecord)>,
        data_key: &EncryptionKey,
    ) -> Result<Vec<u8>> {
        let attempts = replicas.len();
        for (placement, node) in replicas {
            let sealed = match self.chunks.get(&node.endpoint(), placement.blob_id).await {
                Ok(sealed) => sealed,
                Err(e) => {
                    metrics::record_replica_read_failure(&node.id);
                    debug!(node_id = %node.id, chunk_index = index, error = %e, "Replica read failed");
                    continue;
                }
            };
            match self.crypto.decrypt(&sealed, data_key) {
                Ok(plaintext) => return Ok(plaintext),
                Err(e) => {
                    metrics::record_replica_read_failure(&node.id);
                    warn!(node_id = %node.id, chunk_index = index, error = %e, "Replica failed to decrypt");
                }
            }
        }
        Err(VaultError::ReplicaExhausted {
            chunk_index: index,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replicas_ordered_by_node_status() {
        let file = Uuid::new_v4();
        let nodes: HashMap<String, NodeRecord> = [
            ("a", NodeStatus::Down),
            ("b", NodeStatus::Unknown),
            ("c", NodeStatus::Up),
            ("d", NodeStatus::Up),
        ]
        .into_iter()
        .map(|(id, status)| (id.to_string(), NodeRecord::new(id, "localhost", 9000, status)))
        .collect();

        let replicas = ["a", "b", "c", "gone", "d"]
            .iter()
            .map(|node| ChunkPlacement::new(file, 0, *node, Uuid::new_v4(), "x", 1))
            .collect();

        let order: Vec<_> = order_replicas(replicas, &nodes)
            .into_iter()
            .map(|(p, _)| p.node_id)
            .collect();
        assert_eq!(order, vec!["c", "d", "b", "a"]);
    }
}
