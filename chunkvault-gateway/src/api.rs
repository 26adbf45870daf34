//! Gateway REST API
//!
//! File routes identify the caller with `x-owner-id` and carry the file
//! password in `x-file-password`. Admin routes are unauthenticated.

use crate::config::ServerSettings;
use crate::registry::NodeInfo;
use crate::state::{ChunkMap, FileSummary};
use crate::upload::{UploadReceipt, UploadRequest};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Json, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use chunkvault_core::{Password, VaultError};
use chunkvault_rebalancer::RepairReport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

pub const OWNER_HEADER: &str = "x-owner-id";
pub const PASSWORD_HEADER: &str = "x-file-password";

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// HTTP face of a `VaultError`
#[derive(Debug)]
pub struct ApiError(pub VaultError);

impl From<VaultError> for ApiError {
    fn from(e: VaultError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            VaultError::NotFound(_) => StatusCode::NOT_FOUND,
            VaultError::Unauthorized(_) | VaultError::Authentication => StatusCode::UNAUTHORIZED,
            VaultError::Conflict(_) => StatusCode::CONFLICT,
            VaultError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            VaultError::InsufficientNodes { .. } | VaultError::ReplicaExhausted { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            VaultError::StorageTransport { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn owner_id(headers: &HeaderMap) -> ApiResult<Uuid> {
    let raw = header_str(headers, OWNER_HEADER).ok_or_else(|| {
        VaultError::InvalidInput(format!("missing {} header", OWNER_HEADER))
    })?;
    Uuid::parse_str(raw)
        .map_err(|_| VaultError::InvalidInput(format!("{} is not a valid id", OWNER_HEADER)).into())
}

fn password(headers: &HeaderMap) -> ApiResult<Password> {
    // Not trimmed: surrounding spaces are part of the password
    headers
        .get(PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(Password::from)
        .ok_or_else(|| {
            VaultError::InvalidInput(format!("missing {} header", PASSWORD_HEADER)).into()
        })
}

/// `attachment` disposition with characters that would break the header removed
fn content_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

/// Build the gateway router with its middleware
pub fn router(state: Arc<AppState>, server: &ServerSettings) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .nest("/api", routes())
        .layer(DefaultBodyLimit::max(server.max_upload_bytes()))
        .layer(TraceLayer::new_for_http());
    if server.cors_permissive {
        app = app.layer(CorsLayer::permissive());
    }
    app.with_state(state)
}

/// Create the `/api` routes
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/owners", post(register_owner))
        .route("/files", post(upload_file).get(list_files))
        .route("/files/:id", get(download_file).delete(delete_file))
        // Admin
        .route("/admin/nodes", get(list_nodes).post(register_node))
        .route("/admin/files/:id/chunks", get(chunk_map))
        .route("/admin/repair", post(trigger_repair))
}

async fn health() -> &'static str {
    "OK"
}

// ============================================================================
// Owners
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterOwnerRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerResponse {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

async fn register_owner(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterOwnerRequest>,
) -> ApiResult<(StatusCode, Json<OwnerResponse>)> {
    let owner = state.register_owner(&req.name).await?;
    Ok((
        StatusCode::CREATED,
        Json(OwnerResponse {
            id: owner.id,
            name: owner.name,
            created_at: owner.created_at,
        }),
    ))
}

// ============================================================================
// Files
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<UploadReceipt>)> {
    let request = UploadRequest {
        owner_id: owner_id(&headers)?,
        password: password(&headers)?,
        filename: query.filename,
        content_type: header_str(&headers, header::CONTENT_TYPE.as_str()).map(str::to_string),
        data: body,
    };
    let receipt = state.upload(request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn list_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<FileSummary>>> {
    let owner = owner_id(&headers)?;
    Ok(Json(state.list_files(owner).await?))
}

async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let owner = owner_id(&headers)?;
    let file = state.download(file_id, owner, password(&headers)?).await?;
    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.clone()),
            (header::CONTENT_DISPOSITION, content_disposition(&file.filename)),
        ],
        file.data,
    )
        .into_response())
}

async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let owner = owner_id(&headers)?;
    state.delete_file(file_id, owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Admin
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterNodeRequest {
    pub id: String,
    pub host: String,
    pub port: u16,
}

async fn list_nodes(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<NodeInfo>>> {
    Ok(Json(state.list_nodes().await?))
}

async fn register_node(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterNodeRequest>,
) -> ApiResult<(StatusCode, Json<NodeInfo>)> {
    let node = state.register_node(&req.id, &req.host, req.port).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn chunk_map(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<Uuid>,
) -> ApiResult<Json<ChunkMap>> {
    Ok(Json(state.chunk_map(file_id).await?))
}

async fn trigger_repair(State(state): State<Arc<AppState>>) -> ApiResult<Json<RepairReport>> {
    Ok(Json(state.trigger_repair().await?))
}
