//! Playback session API handlers.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;
use reelstream_core::{
    CacheRecord, EngineError, PlaybackError, PlaybackStats, SessionError, SessionInfo,
    SessionState,
};

use super::handlers::{error_response, ApiError, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OpenSessionBody {
    /// Magnet URI, torrent URL or local torrent file path.
    pub resource: String,
    /// Search result to remember once the session opens.
    #[serde(default)]
    pub record: Option<CacheRecord>,
}

#[derive(Debug, Deserialize)]
pub struct PlayBody {
    pub file_index: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: SessionInfo,
    pub stats: PlaybackStats,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: SessionState,
}

fn playback_error(e: PlaybackError) -> ApiError {
    let status = match &e {
        PlaybackError::NoSession => StatusCode::NOT_FOUND,
        PlaybackError::Session(SessionError::FileNotFound(_))
        | PlaybackError::Session(SessionError::Engine(EngineError::FileNotFound(_))) => {
            StatusCode::NOT_FOUND
        }
        PlaybackError::Session(SessionError::InvalidTransition { .. })
        | PlaybackError::Session(SessionError::NoFileSelected)
        | PlaybackError::Cancelled => StatusCode::CONFLICT,
        PlaybackError::Session(SessionError::Engine(EngineError::InvalidResource { .. })) => {
            StatusCode::BAD_REQUEST
        }
        PlaybackError::Session(SessionError::Engine(_)) => StatusCode::BAD_GATEWAY,
        PlaybackError::Stream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PlaybackError::ReadyTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
    };
    error_response(status, e)
}

/// POST /api/v1/session
///
/// Opens a session, replacing any active one.
pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OpenSessionBody>,
) -> Result<Json<SessionInfo>, ApiError> {
    let resource = body.resource.trim();
    if resource.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Resource is required"));
    }

    let info = state.playback().open(resource).await.map_err(playback_error)?;

    if let Some(record) = body.record {
        if let Err(e) = state.cache().save(&record) {
            warn!(hash = %record.hash, error = %e, "Failed to cache opened result");
        }
    }

    Ok(Json(info))
}

/// GET /api/v1/session
pub async fn get_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionResponse>, ApiError> {
    let playback = state.playback();
    let session = playback.info().await.map_err(playback_error)?;
    let stats = playback.stats().await.map_err(playback_error)?;
    Ok(Json(SessionResponse { session, stats }))
}

/// POST /api/v1/session/play
pub async fn play(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PlayBody>,
) -> Result<Json<PlayResponse>, impl IntoResponse> {
    match state.playback().play(body.file_index).await {
        Ok(url) => Ok(Json(PlayResponse { url })),
        Err(e) => Err(playback_error(e)),
    }
}

async fn current_state(state: &AppState) -> Result<Json<StateResponse>, PlaybackError> {
    let info = state.playback().info().await?;
    Ok(Json(StateResponse { state: info.state }))
}

/// POST /api/v1/session/pause
pub async fn pause(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StateResponse>, impl IntoResponse> {
    if let Err(e) = state.playback().pause().await {
        return Err(playback_error(e));
    }
    current_state(&state).await.map_err(playback_error)
}

/// POST /api/v1/session/resume
pub async fn resume(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StateResponse>, impl IntoResponse> {
    if let Err(e) = state.playback().resume().await {
        return Err(playback_error(e));
    }
    current_state(&state).await.map_err(playback_error)
}

/// DELETE /api/v1/session
pub async fn close_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if !state.playback().has_session().await {
        return Err(playback_error(PlaybackError::NoSession));
    }
    state.playback().close().await.map_err(playback_error)?;
    Ok(Json(SuccessResponse {
        message: "Session closed".to_string(),
    }))
}
