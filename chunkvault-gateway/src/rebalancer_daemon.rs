//! Rebalancer Daemon
//!
//! Background task that runs a repair cycle on the configured interval.
//! Manual cycles triggered over the admin API share the same loop and wait
//! for each other.

use crate::state::AppState;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Periodic repair driver
#[derive(Debug, Default)]
pub struct RebalancerDaemon;

impl RebalancerDaemon {
    pub fn new() -> Self {
        Self
    }

    /// Start the rebalancer daemon as a background task
    pub fn start(
        self: Arc<Self>,
        state: Arc<AppState>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let config = state.repair_loop().config().clone();
            if !config.enabled {
                warn!("Rebalancer daemon disabled; repairs run only on request");
                return;
            }

            let mut timer = interval(config.repair_interval());
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer.tick().await;

            info!(
                interval_secs = config.repair_interval().as_secs(),
                verify_checksums = config.verify_checksums,
                "Rebalancer daemon started"
            );

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        // Errors are logged by the state
                        if let Ok(report) = state.trigger_repair().await {
                            debug!(?report, "Scheduled repair cycle finished");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Rebalancer daemon stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use chunkvault_metadata::MemoryMetadataStore;
    use chunkvault_network::MemoryNodeCluster;
    use std::time::Duration;

    fn state(enabled: bool) -> Arc<AppState> {
        let mut config = GatewayConfig::default();
        config.repair.enabled = enabled;
        config.repair.interval_secs = 1;
        config.storage.pbkdf2_iterations = 1_000;
        Arc::new(
            AppState::new(
                &config,
                Arc::new(MemoryMetadataStore::new()),
                Arc::new(MemoryNodeCluster::with_nodes(3)),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_disabled_daemon_exits_immediately() {
        let (_tx, rx) = watch::channel(false);
        let handle = Arc::new(RebalancerDaemon::new()).start(state(false), rx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_daemon_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let handle = Arc::new(RebalancerDaemon::new()).start(state(true), rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
