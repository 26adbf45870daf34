//! Repair loop configuration
//!
//! Built by the gateway from the `[repair]` section of its configuration.

use std::time::Duration;

/// Repair loop configuration
#[derive(Debug, Clone)]
pub struct RebalancerConfig {
    /// Interval between repair cycles in seconds
    pub repair_interval_secs: u64,

    /// Check a source blob's SHA-256 before copying it
    pub verify_checksums: bool,

    /// Run the timer at all (manual cycles still work)
    pub enabled: bool,
}

impl Default for RebalancerConfig {
    fn default() -> Self {
        Self {
            repair_interval_secs: 30,
            verify_checksums: true,
            enabled: true,
        }
    }
}

impl RebalancerConfig {
    /// Get repair interval as Duration
    pub fn repair_interval(&self) -> Duration {
        Duration::from_secs(self.repair_interval_secs.max(1))
    }
}
