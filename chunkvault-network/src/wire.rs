//! JSON bodies of the storage node chunk API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reply to `PUT /chunks/{blobId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutBlobResponse {
    pub blob_id: String,
    pub node_id: String,
    pub size: u64,
}

/// Reply to `GET /chunks/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealthResponse {
    pub node_id: String,
    pub status: String,
    pub total_chunks: u64,
    pub data_dir: String,
    pub timestamp: DateTime<Utc>,
}
