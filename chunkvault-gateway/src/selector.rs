//! Node Selector
//!
//! Picks distinct UP nodes for a new chunk. A shared counter rotates the
//! starting offset so consecutive chunks begin on different nodes.

use chunkvault_core::{Result, VaultError};
use chunkvault_metadata::NodeRecord;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin node selector, safe to share across concurrent uploads
#[derive(Debug, Default)]
pub struct NodeSelector {
    next: AtomicUsize,
}

impl NodeSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose `count` distinct nodes from `up_nodes`.
    ///
    /// Fails with `InsufficientNodes` if fewer than `count` are available.
    pub fn select(&self, up_nodes: &[NodeRecord], count: usize) -> Result<Vec<NodeRecord>> {
        if up_nodes.is_empty() || up_nodes.len() < count {
            return Err(VaultError::InsufficientNodes {
                available: up_nodes.len(),
                required: count,
            });
        }

        let start = self.next.fetch_add(1, Ordering::Relaxed) % up_nodes.len();
        Ok((0..count)
            .map(|i| up_nodes[(start + i) % up_nodes.len()].clone())
            .collect())
    }
}
