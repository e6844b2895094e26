//! Structured JSON API extractor.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::{header, redirect, Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::config::{ApiProviderConfig, DiscoveryConfig, QUERY_PLACEHOLDER};
use crate::retry::{parse_retry_after, retry, Failure, RetryPolicy};

use super::{ExtractError, Extractor, Offer};

static MAGNET_IN_PAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"magnet:\?[^"'<>\s]+"#).expect("magnet pattern is valid")
});

/// Extractor for JSON search APIs described by `[[discovery.providers]]`.
pub struct ApiExtractor {
    client: Client,
    providers: HashMap<String, ApiProviderConfig>,
    policy: RetryPolicy<ExtractError>,
}

impl ApiExtractor {
    /// Create an extractor serving every configured provider.
    pub fn new(config: &DiscoveryConfig) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| ExtractError::ConnectionFailed {
                url: String::new(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        let policy = RetryPolicy::new()
            .with_max_attempts(config.retry_attempts)
            .with_retry_after(Duration::from_millis(config.retry_delay_ms));

        let providers = config
            .providers
            .iter()
            .map(|p| (p.id.clone(), p.clone()))
            .collect();

        Ok(Self {
            client,
            providers,
            policy,
        })
    }

    fn build_search_url(provider: &ApiProviderConfig, query: &str) -> String {
        let escaped = if provider.query_in_path {
            urlencoding::encode(query).into_owned()
        } else {
            url::form_urlencoded::byte_serialize(query.as_bytes()).collect()
        };
        provider.url.replace(QUERY_PLACEHOLDER, &escaped)
    }

    /// One GET, classified for the retry loop.
    async fn fetch(&self, url: &str) -> Result<reqwest::Response, Failure<ExtractError>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Failure::Transient(transport_error(url, &e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(Failure::Transient(ExtractError::RateLimited {
                url: url.to_string(),
                retry_after,
            }));
        }

        if status.is_server_error() {
            return Err(Failure::Transient(ExtractError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        Ok(response)
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, Failure<ExtractError>> {
        let response = self.fetch(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Failure::Permanent(ExtractError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| {
                Failure::Permanent(ExtractError::MalformedResponse {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            })
    }

    async fn fetch_magnet(&self, url: &str) -> Result<String, Failure<ExtractError>> {
        let response = self.fetch(url).await?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if location.starts_with("magnet:") {
                return Ok(location.to_string());
            }
            return Err(Failure::Permanent(ExtractError::NoMagnet(url.to_string())));
        }

        if !status.is_success() {
            return Err(Failure::Permanent(ExtractError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Failure::Transient(transport_error(url, &e)))?;

        MAGNET_IN_PAGE
            .find(&body)
            .map(|m| m.as_str().replace("&amp;", "&"))
            .ok_or_else(|| Failure::Permanent(ExtractError::NoMagnet(url.to_string())))
    }
}

#[async_trait]
impl Extractor for ApiExtractor {
    fn name(&self) -> &str {
        "api"
    }

    fn providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn accepts(&self, provider: &str) -> bool {
        self.providers.contains_key(provider)
    }

    async fn extract(&self, provider: &str, query: &str) -> Result<Vec<Offer>, ExtractError> {
        let config = self
            .providers
            .get(provider)
            .ok_or_else(|| ExtractError::UnsupportedProvider(provider.to_string()))?;

        let url = Self::build_search_url(config, query);
        debug!(provider = provider, "Querying provider API");

        let document = retry(&self.policy, || self.fetch_json(&url)).await?;
        let offers = offers_from_document(config, &url, &document)?;

        debug!(
            provider = provider,
            offers = offers.len(),
            "Provider API query complete"
        );
        Ok(offers)
    }

    async fn follow(&self, provider: &str, link: &str) -> Result<String, ExtractError> {
        if !self.providers.contains_key(provider) {
            return Err(ExtractError::UnsupportedProvider(provider.to_string()));
        }
        retry(&self.policy, || self.fetch_magnet(link)).await
    }
}

fn transport_error(url: &str, e: &reqwest::Error) -> ExtractError {
    if e.is_timeout() {
        ExtractError::Timeout {
            url: url.to_string(),
        }
    } else {
        ExtractError::ConnectionFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Map a provider response onto offers using the configured field pointers.
fn offers_from_document(
    config: &ApiProviderConfig,
    url: &str,
    document: &Value,
) -> Result<Vec<Offer>, ExtractError> {
    let list = if config.results_pointer.is_empty() {
        Some(document)
    } else {
        document.pointer(&config.results_pointer)
    };

    // A missing or null list is how most APIs say "no results".
    let items = match list {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ExtractError::MalformedResponse {
                url: url.to_string(),
                reason: format!("'{}' is not an array", config.results_pointer),
            })
        }
    };

    let fields = &config.fields;
    Ok(items
        .iter()
        .map(|item| {
            let name = field(item, Some(&fields.name)).unwrap_or_default();
            let mut magnet = field(item, fields.magnet.as_ref()).unwrap_or_default();
            if magnet.is_empty() {
                if let Some(hash) = field(item, fields.hash.as_ref()).filter(|h| !h.is_empty()) {
                    magnet = format!(
                        "magnet:?xt=urn:btih:{}&dn={}",
                        hash,
                        urlencoding::encode(&name)
                    );
                }
            }

            let size = field(item, fields.size.as_ref())
                .or_else(|| {
                    item.pointer(fields.size_bytes.as_deref()?)
                        .and_then(Value::as_u64)
                        .map(format_size)
                })
                .unwrap_or_default();

            Offer {
                seeds: field(item, Some(&fields.seeds)).unwrap_or_default(),
                link: field(item, fields.link.as_ref()).filter(|l| !l.is_empty()),
                source: field(item, fields.source.as_ref()).filter(|s| !s.is_empty()),
                name,
                magnet,
                size,
            }
        })
        .collect())
}

/// Read a scalar at `pointer` as a string.
fn field(item: &Value, pointer: Option<&String>) -> Option<String> {
    match item.pointer(pointer?)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Format a byte count with SI units, e.g. `1.5 GB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];
    if bytes < 1000 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if value < 10.0 {
        format!("{:.1} {}", value, UNITS[unit])
    } else {
        format!("{:.0} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiFieldMap;
    use axum::{
        extract::Query,
        http::{HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn provider(id: &str, url: &str) -> ApiProviderConfig {
        ApiProviderConfig {
            id: id.to_string(),
            url: url.to_string(),
            query_in_path: false,
            results_pointer: "/data/movies".to_string(),
            fields: ApiFieldMap {
                name: "/title".to_string(),
                hash: Some("/hash".to_string()),
                seeds: "/seeds".to_string(),
                size_bytes: Some("/size_bytes".to_string()),
                ..Default::default()
            },
        }
    }

    fn discovery(providers: Vec<ApiProviderConfig>) -> DiscoveryConfig {
        DiscoveryConfig {
            retry_delay_ms: 1,
            timeout_secs: 5,
            providers,
            ..Default::default()
        }
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_build_search_url_escaping() {
        let mut p = provider("p", "https://api.example/search?q={query}");
        assert_eq!(
            ApiExtractor::build_search_url(&p, "big buck bunny"),
            "https://api.example/search?q=big+buck+bunny"
        );

        p.url = "https://api.example/search/{query}/1".to_string();
        p.query_in_path = true;
        assert_eq!(
            ApiExtractor::build_search_url(&p, "big buck bunny"),
            "https://api.example/search/big%20buck%20bunny/1"
        );
    }

    #[test]
    fn test_offers_from_document_builds_magnet_from_hash() {
        let p = provider("yts", "https://x/?q={query}");
        let doc = json!({
            "data": {"movies": [
                {"title": "Big Buck Bunny", "hash": "ABCDEF", "seeds": 1200, "size_bytes": 1500000000u64}
            ]}
        });

        let offers = offers_from_document(&p, "https://x", &doc).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].name, "Big Buck Bunny");
        assert_eq!(
            offers[0].magnet,
            "magnet:?xt=urn:btih:ABCDEF&dn=Big%20Buck%20Bunny"
        );
        assert_eq!(offers[0].seeds, "1200");
        assert_eq!(offers[0].size, "1.5 GB");
    }

    #[test]
    fn test_offers_from_document_prefers_magnet_field() {
        let mut p = provider("p", "https://x/?q={query}");
        p.results_pointer = String::new();
        p.fields.magnet = Some("/magnet".to_string());
        p.fields.size = Some("/size".to_string());
        p.fields.source = Some("/site".to_string());
        let doc = json!([
            {"title": "A", "magnet": "magnet:?xt=urn:btih:aaa", "hash": "bbb", "seeds": "1,024", "size": "700 MB", "site": "tracker-one"}
        ]);

        let offers = offers_from_document(&p, "https://x", &doc).unwrap();
        assert_eq!(offers[0].magnet, "magnet:?xt=urn:btih:aaa");
        assert_eq!(offers[0].seeds, "1,024");
        assert_eq!(offers[0].size, "700 MB");
        assert_eq!(offers[0].source.as_deref(), Some("tracker-one"));
    }

    #[test]
    fn test_offers_from_document_null_list_is_empty() {
        let p = provider("p", "https://x/?q={query}");
        let doc = json!({"data": {"movie_count": 0}});
        assert!(offers_from_document(&p, "https://x", &doc).unwrap().is_empty());
    }

    #[test]
    fn test_offers_from_document_rejects_non_array() {
        let p = provider("p", "https://x/?q={query}");
        let doc = json!({"data": {"movies": "nope"}});
        let err = offers_from_document(&p, "https://x", &doc).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedResponse { .. }));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1_500_000_000), "1.5 GB");
        assert_eq!(format_size(734_003_200), "734 MB");
    }

    #[tokio::test]
    async fn test_providers_and_accepts() {
        let extractor = ApiExtractor::new(&discovery(vec![
            provider("zeta", "https://z/?q={query}"),
            provider("alpha", "https://a/?q={query}"),
        ]))
        .unwrap();

        assert_eq!(extractor.providers(), vec!["alpha", "zeta"]);
        assert!(extractor.accepts("alpha"));
        assert!(!extractor.accepts("missing"));
        let err = extractor.extract("missing", "q").await.unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedProvider(_)));
    }

    #[tokio::test]
    async fn test_extract_against_live_api() {
        let router = Router::new().route(
            "/api",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let q = params.get("q").cloned().unwrap_or_default();
                Json(json!({"data": {"movies": [
                    {"title": q, "hash": "c12fe1c06bba254a9dc9f519b335aa7c1367a88a", "seeds": 7, "size_bytes": 2048}
                ]}}))
            }),
        );
        let base = serve(router).await;
        let extractor =
            ApiExtractor::new(&discovery(vec![provider("live", &format!("{base}/api?q={{query}}"))]))
                .unwrap();

        let offers = extractor.extract("live", "Sintel 2010").await.unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].name, "Sintel 2010");
        assert_eq!(offers[0].seeds, "7");
        assert!(offers[0]
            .magnet
            .starts_with("magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a"));
    }

    #[tokio::test]
    async fn test_zero_retry_after_stops() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/api",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        let mut headers = HeaderMap::new();
                        headers.insert("retry-after", "0".parse().unwrap());
                        (AxumStatus::TOO_MANY_REQUESTS, headers).into_response()
                    } else {
                        Json(json!({"data": {"movies": []}})).into_response()
                    }
                }
            }),
        );
        let base = serve(router).await;
        let extractor =
            ApiExtractor::new(&discovery(vec![provider("p", &format!("{base}/api?q={{query}}"))]))
                .unwrap();

        // A zero Retry-After gives up after the first attempt.
        let result = extractor.extract("p", "x").await;
        assert!(matches!(result, Err(ExtractError::RateLimited { .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_without_header_uses_fallback_delay() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/api",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        AxumStatus::TOO_MANY_REQUESTS.into_response()
                    } else {
                        Json(json!({"data": {"movies": []}})).into_response()
                    }
                }
            }),
        );
        let base = serve(router).await;
        let extractor =
            ApiExtractor::new(&discovery(vec![provider("p", &format!("{base}/api?q={{query}}"))]))
                .unwrap();

        let offers = extractor.extract("p", "x").await.unwrap();
        assert!(offers.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/api",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        AxumStatus::SERVICE_UNAVAILABLE.into_response()
                    } else {
                        Json(json!({"data": {"movies": [
                            {"title": "Sintel", "hash": "abc123", "seeds": 4, "size_bytes": 1024}
                        ]}}))
                        .into_response()
                    }
                }
            }),
        );
        let base = serve(router).await;
        let extractor =
            ApiExtractor::new(&discovery(vec![provider("p", &format!("{base}/api?q={{query}}"))]))
                .unwrap();

        let offers = extractor.extract("p", "sintel").await.unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].name, "Sintel");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_server_error_exhausts_attempts() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/api",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    AxumStatus::BAD_GATEWAY
                }
            }),
        );
        let base = serve(router).await;
        let extractor =
            ApiExtractor::new(&discovery(vec![provider("p", &format!("{base}/api?q={{query}}"))]))
                .unwrap();

        let err = extractor.extract("p", "x").await.unwrap_err();
        assert!(matches!(
            err,
            ExtractError::UnexpectedStatus { status: 502, .. }
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/api",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    AxumStatus::FORBIDDEN
                }
            }),
        );
        let base = serve(router).await;
        let extractor =
            ApiExtractor::new(&discovery(vec![provider("p", &format!("{base}/api?q={{query}}"))]))
                .unwrap();

        let err = extractor.extract("p", "x").await.unwrap_err();
        assert!(matches!(
            err,
            ExtractError::UnexpectedStatus { status: 403, .. }
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_permanent() {
        let router = Router::new().route("/api", get(|| async { "<html>not json</html>" }));
        let base = serve(router).await;
        let extractor =
            ApiExtractor::new(&discovery(vec![provider("p", &format!("{base}/api?q={{query}}"))]))
                .unwrap();

        let err = extractor.extract("p", "x").await.unwrap_err();
        assert!(matches!(err, ExtractError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_follow_reads_magnet_from_page_and_redirect() {
        let router = Router::new()
            .route(
                "/detail",
                get(|| async {
                    axum::response::Html(
                        r#"<a href="magnet:?xt=urn:btih:abc123&amp;dn=Page">get</a>"#,
                    )
                }),
            )
            .route(
                "/go",
                get(|| async {
                    (
                        AxumStatus::TEMPORARY_REDIRECT,
                        [("location", "magnet:?xt=urn:btih:def456")],
                    )
                }),
            )
            .route("/empty", get(|| async { "nothing here" }));
        let base = serve(router).await;
        let extractor =
            ApiExtractor::new(&discovery(vec![provider("p", &format!("{base}/api?q={{query}}"))]))
                .unwrap();

        let magnet = extractor.follow("p", &format!("{base}/detail")).await.unwrap();
        assert_eq!(magnet, "magnet:?xt=urn:btih:abc123&dn=Page");

        let magnet = extractor.follow("p", &format!("{base}/go")).await.unwrap();
        assert_eq!(magnet, "magnet:?xt=urn:btih:def456");

        let err = extractor
            .follow("p", &format!("{base}/empty"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NoMagnet(_)));
    }
}
