//! Chunk HTTP API served by each storage node
//!
//! - `PUT /chunks/:blob_id`: store raw bytes, replying `{blobId, nodeId, size}`
//! - `GET /chunks/:blob_id`: raw bytes, 404 if absent
//! - `DELETE /chunks/:blob_id`: 204 whether or not the blob existed
//! - `GET /chunks/health`: `{nodeId, status, totalChunks, dataDir, timestamp}`

use crate::metrics::NodeMetrics;
use crate::store::{BlobStore, StoreError};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use chunkvault_network::{NodeHealthResponse, PutBlobResponse};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, instrument};

/// Shared node state
pub struct NodeState {
    pub node_id: String,
    pub store: BlobStore,
    pub metrics: NodeMetrics,
}

impl NodeState {
    pub fn new(node_id: impl Into<String>, store: BlobStore) -> Self {
        let node_id = node_id.into();
        Self {
            metrics: NodeMetrics::new(node_id.clone()),
            node_id,
            store,
        }
    }
}

/// API error wrapper
#[derive(Debug)]
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            StoreError::InvalidId(_) => (StatusCode::BAD_REQUEST, "invalid_blob_id"),
            StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            StoreError::Io(e) => {
                error!(error = %e, "Blob I/O failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "io")
            }
        };
        let body = json!({ "error": code, "message": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the node router
pub fn router(state: Arc<NodeState>, max_blob_bytes: usize) -> Router {
    Router::new()
        .route("/chunks/health", get(health))
        .route(
            "/chunks/:blob_id",
            put(put_blob).get(get_blob).delete(delete_blob),
        )
        .layer(DefaultBodyLimit::max(max_blob_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// PUT /chunks/:blob_id
#[instrument(skip(state, body), fields(size = body.len()))]
async fn put_blob(
    State(state): State<Arc<NodeState>>,
    Path(blob_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<PutBlobResponse>> {
    let started = Instant::now();
    let size = state.store.write(&blob_id, &body).await.inspect_err(|_| {
        state.metrics.record_error("put");
    })?;
    state.metrics.record("put", body.len(), started.elapsed());

    Ok(Json(PutBlobResponse {
        blob_id,
        node_id: state.node_id.clone(),
        size,
    }))
}

/// GET /chunks/:blob_id
async fn get_blob(
    State(state): State<Arc<NodeState>>,
    Path(blob_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let started = Instant::now();
    let data = state.store.read(&blob_id).await.inspect_err(|_| {
        state.metrics.record_error("get");
    })?;
    state.metrics.record("get", data.len(), started.elapsed());

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        data,
    ))
}

/// DELETE /chunks/:blob_id
async fn delete_blob(
    State(state): State<Arc<NodeState>>,
    Path(blob_id): Path<String>,
) -> ApiResult<StatusCode> {
    let started = Instant::now();
    state.store.delete(&blob_id).await.inspect_err(|_| {
        state.metrics.record_error("delete");
    })?;
    state.metrics.record("delete", 0, started.elapsed());
    Ok(StatusCode::NO_CONTENT)
}

/// GET /chunks/health
async fn health(State(state): State<Arc<NodeState>>) -> ApiResult<Json<NodeHealthResponse>> {
    let total_chunks = state.store.count().await?;
    state.metrics.set_blob_count(total_chunks);

    Ok(Json(NodeHealthResponse {
        node_id: state.node_id.clone(),
        status: "UP".to_string(),
        total_chunks,
        data_dir: state.store.data_dir().display().to_string(),
        timestamp: chrono::Utc::now(),
    }))
}
