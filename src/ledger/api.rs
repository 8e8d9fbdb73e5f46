use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::Deserialize;
use tracing::error;

use super::models::{MovementRequest, NewPool, NewWorker, RecordId, ResourceKind};
use super::service::CirculationService;
use crate::errors::LedgerError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub service: CirculationService,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct UpdateNoteRequest {
    pub note: String,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        if err.is_not_found() {
            ApiError::NotFound(err.to_string())
        } else if err.is_rejection() {
            ApiError::BadRequest(err.to_string())
        } else {
            error!(error = %err, "ledger storage failure");
            ApiError::Internal(err.to_string())
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/workers", post(create_worker))
        .route("/api/workers/{id}", get(get_worker))
        .route("/api/{kind}/pools", get(list_pools).post(create_pool))
        .route("/api/{kind}/pools/{id}", get(get_pool))
        .route("/api/{kind}/pools/{id}/reconcile", get(reconcile_pool))
        .route("/api/{kind}/pools/{id}/ledger", get(list_for_resource))
        .route("/api/{kind}/workers/{id}/ledger", get(list_for_worker))
        .route("/api/{kind}/assign", post(assign))
        .route("/api/{kind}/back", post(back))
        .route("/api/{kind}/ledger/{id}", get(get_entry))
        .route("/api/{kind}/ledger/{id}/note", patch(update_note))
        .route(
            "/api/{kind}/ledger/pair/{resource_id}/{worker_id}",
            get(get_entry_by_pair),
        )
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn parse_kind(raw: &str) -> Result<ResourceKind, ApiError> {
    ResourceKind::from_str(raw).map_err(ApiError::BadRequest)
}

fn parse_id(field: &'static str, raw: &str) -> Result<RecordId, ApiError> {
    Ok(RecordId::parse(field, raw)?)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_worker(
    State(state): State<SharedState>,
    Json(req): Json<NewWorker>,
) -> Result<impl IntoResponse, ApiError> {
    let worker = state.service.create_worker(req).await?;
    Ok((StatusCode::CREATED, Json(worker)))
}

async fn get_worker(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id("workerId", &id)?;
    Ok(Json(state.service.get_worker(id).await?))
}

async fn create_pool(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
    Json(req): Json<NewPool>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let pool = state.service.create_pool(kind, req).await?;
    Ok((StatusCode::CREATED, Json(pool)))
}

async fn list_pools(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.service.list_pools(kind).await?))
}

async fn get_pool(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let id = parse_id("resourceId", &id)?;
    Ok(Json(state.service.get_pool(kind, id).await?))
}

async fn reconcile_pool(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let id = parse_id("resourceId", &id)?;
    Ok(Json(state.service.reconcile(kind, id).await?))
}

async fn list_for_resource(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let id = parse_id("resourceId", &id)?;
    Ok(Json(state.service.list_for_resource(kind, id).await?))
}

async fn list_for_worker(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let id = parse_id("workerId", &id)?;
    Ok(Json(state.service.list_for_worker(kind, id).await?))
}

async fn assign(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
    Json(req): Json<MovementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let mv = req.into_movement()?;
    Ok(Json(state.service.assign(kind, mv).await?))
}

async fn back(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
    Json(req): Json<MovementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let mv = req.into_movement()?;
    Ok(Json(state.service.back(kind, mv).await?))
}

async fn get_entry(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let id = parse_id("ledgerId", &id)?;
    Ok(Json(state.service.get_by_id(kind, id).await?))
}

async fn update_note(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(String, String)>,
    Json(req): Json<UpdateNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let id = parse_id("ledgerId", &id)?;
    Ok(Json(state.service.update_note(kind, id, req.note).await?))
}

async fn get_entry_by_pair(
    State(state): State<SharedState>,
    Path((kind, resource_id, worker_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let resource_id = parse_id("resourceId", &resource_id)?;
    let worker_id = parse_id("workerId", &worker_id)?;
    Ok(Json(
        state
            .service
            .get_by_pair(kind, resource_id, worker_id)
            .await?,
    ))
}
