//! Result cache API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use reelstream_core::{CacheError, CacheRecord, CacheStats};

use super::handlers::{error_response, ApiError, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CacheListResponse {
    pub records: Vec<CacheRecord>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub message: String,
    pub removed: u64,
}

fn cache_error(e: CacheError) -> ApiError {
    let status = match e {
        CacheError::NotFound(_) => StatusCode::NOT_FOUND,
        CacheError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
        CacheError::Database(_) | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e)
}

/// GET /api/v1/cache
///
/// Cached records, most recent first.
pub async fn list_cache(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CacheListResponse>, impl IntoResponse> {
    match state.cache().list() {
        Ok(records) => {
            let total = records.len();
            Ok(Json(CacheListResponse { records, total }))
        }
        Err(e) => Err(cache_error(e)),
    }
}

/// POST /api/v1/cache
pub async fn add_entry(
    State(state): State<Arc<AppState>>,
    Json(record): Json<CacheRecord>,
) -> Result<(StatusCode, Json<CacheRecord>), impl IntoResponse> {
    match state.cache().save(&record) {
        Ok(()) => Ok((StatusCode::CREATED, Json(record))),
        Err(e) => Err(cache_error(e)),
    }
}

/// GET /api/v1/cache/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CacheStats>, impl IntoResponse> {
    state
        .cache()
        .stats()
        .map(Json)
        .map_err(cache_error)
}

/// GET /api/v1/cache/{hash}
pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<CacheRecord>, impl IntoResponse> {
    state
        .cache()
        .get(&hash)
        .map(Json)
        .map_err(cache_error)
}

/// DELETE /api/v1/cache/{hash}
pub async fn remove_entry(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<SuccessResponse>, impl IntoResponse> {
    match state.cache().remove(&hash) {
        Ok(()) => Ok(Json(SuccessResponse {
            message: format!("Removed {} from cache", hash),
        })),
        Err(e) => Err(cache_error(e)),
    }
}

/// DELETE /api/v1/cache
pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClearResponse>, impl IntoResponse> {
    match state.cache().clear() {
        Ok(removed) => Ok(Json(ClearResponse {
            message: "Cache cleared".to_string(),
            removed,
        })),
        Err(e) => Err(cache_error(e)),
    }
}
