//! Discovery API handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;
use reelstream_core::{DiscoveryError, ReconciledResult, SearchRequest};

use super::handlers::error_response;
use crate::state::AppState;

/// Reported instead of an empty list so clients can tell it from a failure.
pub const NO_RESULTS: &str = "No results found";

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query: String,
    #[serde(default)]
    pub providers: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<ReconciledResult>,
    pub total: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub provider_errors: HashMap<String, String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub group_errors: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<String>,
    pub qualities: Vec<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/providers
pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<ProvidersResponse> {
    let discovery = state.discovery();
    Json(ProvidersResponse {
        providers: discovery.providers(),
        qualities: discovery.qualities().to_vec(),
    })
}

/// POST /api/v1/search
///
/// Fan out to every selected provider and return the reconciled results.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, impl IntoResponse> {
    debug!(query = %body.query, providers = ?body.providers, "Search requested");
    let mut request = SearchRequest::new(body.query.clone());
    if let Some(providers) = body.providers {
        request = request.with_providers(providers);
    }

    match state.discovery().search(&request).await {
        Ok(outcome) => {
            let message = outcome.is_empty().then(|| NO_RESULTS.to_string());
            Ok(Json(SearchResponse {
                query: body.query,
                total: outcome.results.len(),
                results: outcome.results,
                duration_ms: outcome.duration_ms,
                provider_errors: outcome.provider_errors,
                group_errors: outcome.group_errors,
                message,
            }))
        }
        Err(e @ (DiscoveryError::EmptyQuery | DiscoveryError::InvalidMagnet(_))) => {
            Err(error_response(StatusCode::BAD_REQUEST, e))
        }
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}
