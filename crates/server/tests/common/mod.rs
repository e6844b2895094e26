//! Common test utilities for API testing with mocks.
//!
//! Builds an in-process router with a mock extractor, a mock torrent engine
//! and an in-memory result cache, so the whole control API can be exercised
//! without network access.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use reelstream_core::{
    testing::{MockEngine, MockExtractor, MockTorrent},
    Config, DiscoveryOrchestrator, PlaybackController, ResultCache, SessionConfig, SqliteCache,
    StreamConfig,
};

/// Re-export fixtures for test convenience
pub use reelstream_core::testing::fixtures;

/// Resource the fixture's engine knows about.
pub const RESOURCE: &str = "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

/// Providers served by the fixture's extractor.
pub const PROVIDERS: &[&str] = &["alpha", "beta"];

/// Test fixture with mock dependencies.
///
/// - Search providers (MockExtractor)
/// - Torrent engine with one known torrent (MockEngine, MockTorrent)
/// - Result cache (SqliteCache, in memory)
pub struct TestFixture {
    pub router: Router,
    pub extractor: Arc<MockExtractor>,
    pub engine: Arc<MockEngine>,
    /// The torrent behind [`RESOURCE`].
    pub torrent: Arc<MockTorrent>,
    pub cache: Arc<SqliteCache>,
    pub playback: Arc<PlaybackController>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        let extractor = Arc::new(MockExtractor::new(PROVIDERS));
        let engine = Arc::new(MockEngine::new());
        let torrent = engine.add_torrent(RESOURCE, fixtures::mock_torrent()).await;
        let cache = Arc::new(SqliteCache::in_memory().expect("Failed to create cache"));

        let mut config = Config::default();
        config.session = SessionConfig {
            readiness_poll_ms: 10,
            ..Default::default()
        };
        config.stream = StreamConfig {
            port: 0,
            grace_period_secs: 1,
            public_host: "127.0.0.1".to_string(),
        };

        let discovery = Arc::new(
            DiscoveryOrchestrator::new(config.discovery.qualities.clone())
                .with_extractor(extractor.clone())
                .with_cache(cache.clone()),
        );
        let playback = Arc::new(PlaybackController::new(
            engine.clone(),
            config.session.clone(),
            config.stream.clone(),
        ));

        let state = Arc::new(reelstream_server::state::AppState::new(
            config,
            discovery,
            Arc::clone(&cache) as Arc<dyn ResultCache>,
            Arc::clone(&playback),
        ));
        let router = reelstream_server::api::create_router(state);

        Self {
            router,
            extractor,
            engine,
            torrent,
            cache,
            playback,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
