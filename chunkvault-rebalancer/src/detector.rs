//! Chunk Detector
//!
//! Builds a snapshot of replica health from the metadata store:
//! - Placements grouped by `(file_id, chunk_index)`
//! - Per-group count of replicas on UP nodes versus the file's target
//! - Chunk indices of visible files that have no placement at all
//! - DEGRADED files that are fully readable again
//!
//! UPLOADING files are ignored; their placements are still being written.

use chunkvault_core::Result;
use chunkvault_metadata::{ChunkPlacement, FileRecord, FileStatus, MetadataStore, NodeRecord};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Chunk health status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkHealth {
    /// At least `target` replicas on UP nodes
    Healthy,
    /// Some but not enough replicas on UP nodes
    UnderReplicated { healthy: usize, target: usize },
    /// No replica on an UP node
    Critical,
}

impl ChunkHealth {
    pub fn classify(healthy: usize, target: usize) -> Self {
        if healthy >= target {
            ChunkHealth::Healthy
        } else if healthy == 0 {
            ChunkHealth::Critical
        } else {
            ChunkHealth::UnderReplicated { healthy, target }
        }
    }
}

/// A chunk that needs attention
#[derive(Debug, Clone)]
pub struct ChunkIssue {
    pub file_id: Uuid,
    pub chunk_index: i32,
    pub health: ChunkHealth,
    /// Replication factor of the owning file
    pub target: usize,
    /// Every replica row, whatever its node's status
    pub replicas: Vec<ChunkPlacement>,
}

impl ChunkIssue {
    /// Replicas whose node is currently UP, in stored order
    pub fn healthy_replicas<'a>(
        &'a self,
        nodes: &'a HashMap<String, NodeRecord>,
    ) -> impl Iterator<Item = &'a ChunkPlacement> + 'a {
        self.replicas
            .iter()
            .filter(move |p| nodes.get(&p.node_id).is_some_and(NodeRecord::is_up))
    }

    /// Replicas still missing to reach the target
    pub fn needed(&self, nodes: &HashMap<String, NodeRecord>) -> usize {
        self.target
            .saturating_sub(self.healthy_replicas(nodes).count())
    }
}

/// Scan results
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Chunk groups examined
    pub groups_scanned: usize,
    /// Groups with at least one but fewer than target healthy replicas
    pub under_replicated: Vec<ChunkIssue>,
    /// Groups with no healthy replica, including indices with no rows at all
    pub critical: Vec<ChunkIssue>,
    /// DEGRADED files whose every chunk has a healthy replica
    pub restorable: Vec<Uuid>,
    /// Node table at scan time
    pub nodes: HashMap<String, NodeRecord>,
    /// Placement count per node
    pub load: HashMap<String, usize>,
    pub duration: Duration,
}

impl ScanResult {
    /// Files that have at least one critical chunk
    pub fn critical_files(&self) -> BTreeSet<Uuid> {
        self.critical.iter().map(|issue| issue.file_id).collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "Scanned {} chunk groups in {:?}: {} under-replicated, {} critical, {} restorable files",
            self.groups_scanned,
            self.duration,
            self.under_replicated.len(),
            self.critical.len(),
            self.restorable.len()
        )
    }
}

/// Chunk detector
#[derive(Debug, Default, Clone)]
pub struct Detector;

impl Detector {
    pub fn new() -> Self {
        Self
    }

    /// Snapshot replica health across every visible file.
    #[instrument(skip(self, store))]
    pub async fn scan(&self, store: &dyn MetadataStore) -> Result<ScanResult> {
        let start = Instant::now();
        let mut result = ScanResult::default();

        result.nodes = store
            .list_nodes()
            .await?
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();

        let files: HashMap<Uuid, FileRecord> = store
            .list_files()
            .await?
            .into_iter()
            .filter(|f| f.status.is_visible())
            .map(|f| (f.id, f))
            .collect();

        let mut groups: BTreeMap<(Uuid, i32), Vec<ChunkPlacement>> = BTreeMap::new();
        for placement in store.all_placements().await? {
            *result.load.entry(placement.node_id.clone()).or_default() += 1;
            if files.contains_key(&placement.file_id) {
                groups.entry(placement.chunk_key()).or_default().push(placement);
            }
        }

        for ((file_id, chunk_index), replicas) in groups.iter() {
            let Some(file) = files.get(file_id) else {
                continue;
            };
            result.groups_scanned += 1;

            let healthy = replicas
                .iter()
                .filter(|p| result.nodes.get(&p.node_id).is_some_and(NodeRecord::is_up))
                .count();
            let target = file.replication_factor();
            let health = ChunkHealth::classify(healthy, target);

            let issue = ChunkIssue {
                file_id: *file_id,
                chunk_index: *chunk_index,
                health,
                target,
                replicas: replicas.clone(),
            };
            match health {
                ChunkHealth::Healthy => {}
                ChunkHealth::UnderReplicated { .. } => result.under_replicated.push(issue),
                ChunkHealth::Critical => result.critical.push(issue),
            }
        }

        // Chunk indices with no placement rows at all
        for file in files.values() {
            for chunk_index in 0..file.chunk_count {
                if !groups.contains_key(&(file.id, chunk_index)) {
                    debug!(file_id = %file.id, chunk_index, "Chunk has no placements");
                    result.critical.push(ChunkIssue {
                        file_id: file.id,
                        chunk_index,
                        health: ChunkHealth::Critical,
                        target: file.replication_factor(),
                        replicas: Vec::new(),
                    });
                }
            }
        }

        let critical_files = result.critical_files();
        result.restorable = files
            .values()
            .filter(|f| f.status == FileStatus::Degraded && !critical_files.contains(&f.id))
            .map(|f| f.id)
            .collect();
        result.restorable.sort();

        result.duration = start.elapsed();
        info!(
            groups = result.groups_scanned,
            under_replicated = result.under_replicated.len(),
            critical = result.critical.len(),
            duration = ?result.duration,
            "Scan complete"
        );

        Ok(result)
    }
}
