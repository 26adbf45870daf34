//! Repair Executor
//!
//! Carries out a [`RepairTask`]: read the chunk from the first source that
//! answers with intact bytes, write it to every target in parallel, and record
//! a placement for each successful write.

use crate::planner::RepairTask;
use bytes::Bytes;
use chunkvault_core::{verify_checksum, NodeEndpoint};
use chunkvault_metadata::{ChunkPlacement, MetadataStore};
use chunkvault_network::ChunkStore;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one task
#[derive(Debug, Default, Clone)]
pub struct TaskResult {
    /// Node the bytes were read from, if any source worked
    pub source: Option<String>,
    /// Placements recorded on new nodes
    pub written: Vec<ChunkPlacement>,
    /// Targets that failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl TaskResult {
    pub fn replicas_written(&self) -> usize {
        self.written.len()
    }
}

/// Repair executor
pub struct Executor {
    store: Arc<dyn MetadataStore>,
    chunks: Arc<dyn ChunkStore>,
    verify_checksums: bool,
}

impl Executor {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        chunks: Arc<dyn ChunkStore>,
        verify_checksums: bool,
    ) -> Self {
        Self {
            store,
            chunks,
            verify_checksums,
        }
    }

    /// Fetch bytes from the first usable source.
    async fn read_source(&self, task: &RepairTask) -> Option<(ChunkPlacement, Bytes)> {
        for (placement, endpoint) in &task.sources {
            match self.chunks.get(endpoint, placement.blob_id).await {
                Ok(data) => {
                    if self.verify_checksums && !verify_checksum(&data, &placement.checksum) {
                        warn!(
                            file_id = %task.file_id,
                            chunk_index = task.chunk_index,
                            node = %endpoint.id,
                            "Source replica failed checksum, trying next"
                        );
                        continue;
                    }
                    return Some((placement.clone(), data));
                }
                Err(e) => {
                    debug!(node = %endpoint.id, error = %e, "Source read failed");
                }
            }
        }
        None
    }

    async fn copy_to(
        &self,
        source: &ChunkPlacement,
        target: &NodeEndpoint,
        data: Bytes,
    ) -> Result<ChunkPlacement, String> {
        let blob_id = Uuid::new_v4();
        let size = data.len();
        self.chunks
            .put(target, blob_id, data)
            .await
            .map_err(|e| e.to_string())?;

        let placement = ChunkPlacement::new(
            source.file_id,
            source.chunk_index.max(0) as u32,
            target.id.clone(),
            blob_id,
            source.checksum.clone(),
            size,
        );
        if let Err(e) = self.store.insert_placement(&placement).await {
            // The blob is unreferenced without its row
            self.chunks.delete(target, blob_id).await;
            return Err(e.to_string());
        }
        Ok(placement)
    }

    /// Execute one task
    pub async fn execute(&self, task: &RepairTask) -> TaskResult {
        let mut result = TaskResult::default();

        let Some((source, data)) = self.read_source(task).await else {
            warn!(
                file_id = %task.file_id,
                chunk_index = task.chunk_index,
                sources = task.sources.len(),
                "No readable source replica"
            );
            return result;
        };
        result.source = Some(source.node_id.clone());

        let writes = task
            .targets
            .iter()
            .map(|target| self.copy_to(&source, target, data.clone()));
        for (target, outcome) in task.targets.iter().zip(join_all(writes).await) {
            match outcome {
                Ok(placement) => result.written.push(placement),
                Err(reason) => {
                    warn!(node = %target.id, error = %reason, "Repair write failed");
                    result.failed.push((target.id.clone(), reason));
                }
            }
        }

        info!(
            file_id = %task.file_id,
            chunk_index = task.chunk_index,
            source = %source.node_id,
            written = result.written.len(),
            failed = result.failed.len(),
            "Repair task finished"
        );
        result
    }
}
