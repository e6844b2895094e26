use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::{cache, handlers, middleware::metrics_middleware, search, session};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::<Arc<AppState>>::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Discovery
        .route("/providers", get(search::list_providers))
        .route("/search", post(search::search))
        // Result cache
        .route(
            "/cache",
            get(cache::list_cache)
                .post(cache::add_entry)
                .delete(cache::clear_cache),
        )
        .route("/cache/stats", get(cache::get_stats))
        .route(
            "/cache/{hash}",
            get(cache::get_entry).delete(cache::remove_entry),
        )
        // Session and playback
        .route(
            "/session",
            get(session::get_session)
                .post(session::open_session)
                .delete(session::close_session),
        )
        .route("/session/play", post(session::play))
        .route("/session/pause", post(session::pause))
        .route("/session/resume", post(session::resume));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(metrics_middleware)),
        )
}
