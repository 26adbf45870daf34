//! Repair Planner
//!
//! Turns an under-replicated chunk into a concrete copy task:
//! - Sources are replicas on UP nodes, in stored order
//! - Targets are UP nodes not already holding the chunk, least-loaded first
//!
//! The planner keeps a running load table so that consecutive tasks in one
//! cycle spread their new replicas across the cluster.

use chunkvault_core::NodeEndpoint;
use chunkvault_metadata::{ChunkPlacement, NodeRecord};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

/// A single repair task
#[derive(Debug, Clone)]
pub struct RepairTask {
    pub file_id: Uuid,
    pub chunk_index: i32,
    /// Candidate sources with their node addresses, tried in order
    pub sources: Vec<(ChunkPlacement, NodeEndpoint)>,
    /// Nodes to receive a new replica
    pub targets: Vec<NodeEndpoint>,
}

/// Repair planner
#[derive(Debug)]
pub struct Planner {
    nodes: HashMap<String, NodeRecord>,
    load: HashMap<String, usize>,
}

impl Planner {
    /// `load` is the number of placements each node currently holds.
    pub fn new(nodes: HashMap<String, NodeRecord>, load: HashMap<String, usize>) -> Self {
        Self { nodes, load }
    }

    /// Plan a copy for one chunk given its current replica rows.
    ///
    /// Returns `None` when the chunk is already at `target` or when there is
    /// nothing to copy from or nowhere to copy to.
    pub fn plan(
        &mut self,
        file_id: Uuid,
        chunk_index: i32,
        replicas: &[ChunkPlacement],
        target: usize,
    ) -> Option<RepairTask> {
        let sources: Vec<(ChunkPlacement, NodeEndpoint)> = replicas
            .iter()
            .filter_map(|p| {
                self.nodes
                    .get(&p.node_id)
                    .filter(|n| n.is_up())
                    .map(|n| (p.clone(), n.endpoint()))
            })
            .collect();

        let needed = target.saturating_sub(sources.len());
        if needed == 0 || sources.is_empty() {
            return None;
        }

        let holders: HashSet<&str> = replicas.iter().map(|p| p.node_id.as_str()).collect();
        let mut candidates: Vec<&NodeRecord> = self
            .nodes
            .values()
            .filter(|n| n.is_up() && !holders.contains(n.id.as_str()))
            .collect();
        candidates.sort_by(|a, b| {
            let la = self.load.get(&a.id).copied().unwrap_or(0);
            let lb = self.load.get(&b.id).copied().unwrap_or(0);
            la.cmp(&lb).then_with(|| a.id.cmp(&b.id))
        });

        let targets: Vec<NodeEndpoint> = candidates
            .into_iter()
            .take(needed)
            .map(NodeRecord::endpoint)
            .collect();
        if targets.is_empty() {
            debug!(%file_id, chunk_index, "No eligible repair targets");
            return None;
        }

        for node in &targets {
            *self.load.entry(node.id.clone()).or_default() += 1;
        }

        Some(RepairTask {
            file_id,
            chunk_index,
            sources,
            targets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkvault_metadata::NodeStatus;

    fn nodes(spec: &[(&str, NodeStatus)]) -> HashMap<String, NodeRecord> {
        spec.iter()
            .map(|(id, status)| (id.to_string(), NodeRecord::new(*id, "localhost", 9000, *status)))
            .collect()
    }

    fn replica(file: Uuid, node: &str) -> ChunkPlacement {
        ChunkPlacement::new(file, 0, node, Uuid::new_v4(), "abc", 10)
    }

    #[test]
    fn test_targets_exclude_holders_and_down_nodes() {
        let file = Uuid::new_v4();
        let nodes = nodes(&[
            ("a", NodeStatus::Up),
            ("b", NodeStatus::Down),
            ("c", NodeStatus::Up),
            ("d", NodeStatus::Up),
            ("e", NodeStatus::Unknown),
        ]);
        let replicas = vec![replica(file, "a"), replica(file, "b")];

        let mut planner = Planner::new(nodes, HashMap::new());
        let task = planner.plan(file, 0, &replicas, 3).unwrap();

        assert_eq!(task.sources.len(), 1);
        assert_eq!(task.sources[0].1.id, "a");
        let targets: Vec<_> = task.targets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(targets, vec!["c", "d"]);
    }

    #[test]
    fn test_least_loaded_first() {
        let file = Uuid::new_v4();
        let nodes = nodes(&[
            ("a", NodeStatus::Up),
            ("b", NodeStatus::Up),
            ("c", NodeStatus::Up),
            ("d", NodeStatus::Up),
        ]);
        let load = HashMap::from([("b".to_string(), 5), ("c".to_string(), 1), ("d".to_string(), 2)]);
        let mut planner = Planner::new(nodes, load);

        let replicas = vec![replica(file, "a")];
        let first = planner.plan(file, 0, &replicas, 2).unwrap();
        assert_eq!(first.targets[0].id, "c");

        // c is now at 2 and ties with d; id breaks the tie
        let second = planner.plan(file, 1, &replicas, 2).unwrap();
        assert_eq!(second.targets[0].id, "c");
        let third = planner.plan(file, 2, &replicas, 2).unwrap();
        assert_eq!(third.targets[0].id, "d");
    }

    #[test]
    fn test_nothing_to_do() {
        let file = Uuid::new_v4();
        let mut planner = Planner::new(
            nodes(&[("a", NodeStatus::Up), ("b", NodeStatus::Down)]),
            HashMap::new(),
        );

        // Already at target
        assert!(planner.plan(file, 0, &[replica(file, "a")], 1).is_none());
        // No healthy source
        assert!(planner.plan(file, 0, &[replica(file, "b")], 2).is_none());
        // No eligible target
        assert!(planner.plan(file, 0, &[replica(file, "a")], 2).is_none());
    }
}
