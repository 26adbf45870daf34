//! Node Health Monitor
//!
//! Background task that re-probes every known node on a fixed interval:
//! - probe succeeds -> UP, heartbeat refreshed
//! - probe fails -> DOWN, heartbeat left as it was
//!
//! This is the only writer of a node's status after registration.

use crate::metrics;
use chrono::Utc;
use chunkvault_core::Result;
use chunkvault_metadata::{MetadataStore, NodeRecord, NodeStatus};
use chunkvault_network::ChunkStore;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Outcome of one probe round
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub up: usize,
    pub down: usize,
    /// Nodes still UNKNOWN after the round, e.g. registered while it ran
    pub unknown: usize,
    /// Nodes whose status changed this round
    pub transitions: usize,
}

/// Node health monitor
pub struct NodeMonitor {
    store: Arc<dyn MetadataStore>,
    chunks: Arc<dyn ChunkStore>,
    check_interval: Duration,
}

impl NodeMonitor {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        chunks: Arc<dyn ChunkStore>,
        check_interval: Duration,
    ) -> Self {
        Self {
            store,
            chunks,
            check_interval,
        }
    }

    /// Start the background monitoring loop
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut check_timer = interval(self.check_interval);
            check_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Startup registration has just probed every node
            check_timer.tick().await;

            info!(
                interval_secs = self.check_interval.as_secs(),
                "Node health monitor started"
            );

            loop {
                tokio::select! {
                    _ = check_timer.tick() => {
                        if let Err(e) = self.run_check_cycle().await {
                            error!(error = %e, "Node health check cycle failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Node health monitor stopped");
        })
    }

    async fn probe(&self, node: &NodeRecord) -> bool {
        self.chunks.health_probe(&node.endpoint()).await
    }

    /// Probe every known node once and record the results.
    pub async fn run_check_cycle(&self) -> Result<CheckSummary> {
        let start = Instant::now();
        let nodes = self.store.list_nodes().await?;

        let results = join_all(nodes.iter().map(|node| self.probe(node))).await;

        let mut summary = CheckSummary::default();
        for (node, healthy) in nodes.iter().zip(results) {
            let (status, heartbeat) = if healthy {
                (NodeStatus::Up, Some(Utc::now()))
            } else {
                (NodeStatus::Down, None)
            };

            if status != node.status {
                summary.transitions += 1;
                match status {
                    NodeStatus::Up => info!(
                        node_id = %node.id,
                        from = %node.status,
                        "Node is UP"
                    ),
                    _ => warn!(
                        node_id = %node.id,
                        from = %node.status,
                        last_heartbeat = ?node.last_heartbeat,
                        "Node is DOWN"
                    ),
                }
            }

            if let Err(e) = self
                .store
                .update_node_health(&node.id, status, heartbeat)
                .await
            {
                // Node removed between listing and update
                warn!(node_id = %node.id, error = %e, "Failed to record node health");
                continue;
            }

            match status {
                NodeStatus::Up => summary.up += 1,
                _ => summary.down += 1,
            }
        }

        summary.unknown = self
            .store
            .list_nodes_by_status(NodeStatus::Unknown)
            .await?
            .len();

        metrics::set_node_counts(summary.up, summary.down, summary.unknown);
        debug!(
            up = summary.up,
            down = summary.down,
            unknown = summary.unknown,
            transitions = summary.transitions,
            duration_ms = start.elapsed().as_millis() as u64,
            "Node health check complete"
        );
        Ok(summary)
    }
}
