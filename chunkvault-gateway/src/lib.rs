//! ChunkVault Gateway Library
//!
//! The orchestrator: it splits uploads into encrypted chunks, places replicas
//! on storage nodes, rebuilds files on download, watches node health and
//! repairs under-replicated chunks in the background.
//!
//! Re-exports core types for integration testing and the binary.

pub mod api;
pub mod config;
pub mod download;
pub mod metrics;
pub mod node_monitor;
pub mod rebalancer_daemon;
pub mod registry;
pub mod selector;
pub mod state;
pub mod upload;

pub use api::{router, ApiError};
pub use config::{ConfigError, GatewayConfig, NodeSpec};
pub use download::DownloadedFile;
pub use node_monitor::{CheckSummary, NodeMonitor};
pub use rebalancer_daemon::RebalancerDaemon;
pub use registry::{NodeInfo, NodeRegistry};
pub use selector::NodeSelector;
pub use state::{AppState, ChunkEntry, ChunkMap, FileSummary, ReplicaEntry};
pub use upload::{UploadReceipt, UploadRequest};
