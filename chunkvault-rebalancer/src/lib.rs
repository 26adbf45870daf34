//! ChunkVault Rebalancer Library
//!
//! Keeps every chunk at its file's replication factor:
//! - Detection: find chunk groups with fewer healthy replicas than required
//! - Repair: copy a verified replica to least-loaded UP nodes
//! - File status: mark unreadable files DEGRADED and restore them once readable
//!
//! [`RepairLoop`] runs one cycle at a time; callers drive it from a timer or on demand.

pub mod config;
pub mod detector;
pub mod executor;
pub mod planner;

pub use config::RebalancerConfig;
pub use detector::{ChunkHealth, ChunkIssue, Detector, ScanResult};
pub use executor::{Executor, TaskResult};
pub use planner::{Planner, RepairTask};

use chunkvault_core::Result;
use chunkvault_metadata::{FileLocks, FileStatus, MetadataStore};
use chunkvault_network::ChunkStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a repair cycle did
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub groups_scanned: usize,
    pub under_replicated: usize,
    pub repaired_groups: usize,
    pub replicas_written: usize,
    /// Repair copies that a target node rejected or never acknowledged
    pub failed_writes: usize,
    pub degraded_files: usize,
    pub restored_files: usize,
    /// Files skipped because an upload or delete held them
    pub skipped_busy: usize,
}

/// Periodic replication repair
pub struct RepairLoop {
    store: Arc<dyn MetadataStore>,
    chunks: Arc<dyn ChunkStore>,
    locks: Arc<FileLocks>,
    config: RebalancerConfig,
    detector: Detector,
    cycle: Mutex<()>,
}

impl RepairLoop {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        chunks: Arc<dyn ChunkStore>,
        locks: Arc<FileLocks>,
        config: RebalancerConfig,
    ) -> Self {
        Self {
            store,
            chunks,
            locks,
            config,
            detector: Detector::new(),
            cycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RebalancerConfig {
        &self.config
    }

    /// Run one full cycle. Concurrent callers wait for the running cycle.
    pub async fn run_cycle(&self) -> Result<RepairReport> {
        let _cycle = self.cycle.lock().await;
        let started = Instant::now();

        let scan = self.detector.scan(self.store.as_ref()).await?;
        debug!("{}", scan.summary());

        let mut report = RepairReport {
            groups_scanned: scan.groups_scanned,
            under_replicated: scan.under_replicated.len(),
            ..Default::default()
        };

        for file_id in scan.critical_files() {
            match self.mark_degraded(file_id).await? {
                Some(true) => report.degraded_files += 1,
                Some(false) => {}
                None => report.skipped_busy += 1,
            }
        }

        let executor = Executor::new(
            self.store.clone(),
            self.chunks.clone(),
            self.config.verify_checksums,
        );
        let mut planner = Planner::new(scan.nodes.clone(), scan.load.clone());

        for issue in &scan.under_replicated {
            let Some(_guard) = self.locks.try_lock(issue.file_id) else {
                debug!(file_id = %issue.file_id, "File busy, repair deferred");
                report.skipped_busy += 1;
                continue;
            };

            // State may have moved since the scan
            let visible = self
                .store
                .get_file(issue.file_id)
                .await?
                .is_some_and(|f| f.status.is_visible());
            if !visible {
                continue;
            }
            let replicas = self
                .store
                .placements_for_chunk(issue.file_id, issue.chunk_index)
                .await?;

            let Some(task) = planner.plan(issue.file_id, issue.chunk_index, &replicas, issue.target)
            else {
                continue;
            };
            let result = executor.execute(&task).await;
            report.failed_writes += result.failed.len();
            if result.replicas_written() > 0 {
                report.repaired_groups += 1;
                report.replicas_written += result.replicas_written();
            }
        }

        for file_id in &scan.restorable {
            match self.restore(*file_id).await? {
                Some(true) => report.restored_files += 1,
                Some(false) => {}
                None => report.skipped_busy += 1,
            }
        }

        info!(
            groups = report.groups_scanned,
            under_replicated = report.under_replicated,
            repaired = report.repaired_groups,
            replicas_written = report.replicas_written,
            failed_writes = report.failed_writes,
            degraded = report.degraded_files,
            restored = report.restored_files,
            skipped_busy = report.skipped_busy,
            duration = ?started.elapsed(),
            "Repair cycle complete"
        );
        Ok(report)
    }

    /// COMPLETE -> DEGRADED. `None` if the file is busy.
    async fn mark_degraded(&self, file_id: Uuid) -> Result<Option<bool>> {
        let Some(_guard) = self.locks.try_lock(file_id) else {
            return Ok(None);
        };
        match self.store.get_file(file_id).await? {
            Some(file) if file.status == FileStatus::Complete => {
                self.store
                    .set_file_status(file_id, FileStatus::Degraded)
                    .await?;
                warn!(%file_id, filename = %file.filename, "File degraded: a chunk has no healthy replica");
                Ok(Some(true))
            }
            _ => Ok(Some(false)),
        }
    }

    /// DEGRADED -> COMPLETE. `None` if the file is busy.
    async fn restore(&self, file_id: Uuid) -> Result<Option<bool>> {
        let Some(_guard) = self.locks.try_lock(file_id) else {
            return Ok(None);
        };
        match self.store.get_file(file_id).await? {
            Some(file) if file.status == FileStatus::Degraded => {
                self.store
                    .set_file_status(file_id, FileStatus::Complete)
                    .await?;
                info!(%file_id, filename = %file.filename, "File restored to COMPLETE");
                Ok(Some(true))
            }
            _ => Ok(Some(false)),
        }
    }
}
