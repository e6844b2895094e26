//! Discovery endpoint tests.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{fixtures, TestFixture};
use reelstream_core::{CacheRecord, ExtractError, ResultCache};

#[tokio::test]
async fn test_providers_lists_extractor_providers_and_qualities() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/providers").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["providers"], json!(["alpha", "beta"]));
    assert_eq!(response.body["qualities"], json!(["720p", "1080p", "2160p"]));
}

#[tokio::test]
async fn test_search_collapses_duplicates_across_providers() {
    let fixture = TestFixture::new().await;
    fixture
        .extractor
        .set_offers("alpha", vec![fixtures::offer("Sintel 2010 1080p", fixtures::HASH_A, "50")])
        .await;
    fixture
        .extractor
        .set_offers("beta", vec![fixtures::offer("Sintel 2010 1080p", fixtures::HASH_A, "80")])
        .await;

    let response = fixture
        .post("/api/v1/search", json!({ "query": "sintel" }))
        .await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "total", json!(1));
    let result = &response.body["results"][0];
    assert_eq!(result["seeds"], 80);
    assert_eq!(result["provider"], "alpha,beta");
    assert_eq!(result["quality"], 2);
    assert_eq!(result["quality_label"], "1080p");
    assert_eq!(result["cached"], false);
    assert!(response.body["message"].is_null());
}

#[tokio::test]
async fn test_search_ranks_by_quality_then_seeds() {
    let fixture = TestFixture::new().await;
    fixture
        .extractor
        .set_offers(
            "alpha",
            vec![
                fixtures::offer("Sintel 720p", fixtures::HASH_A, "500"),
                fixtures::offer("Sintel 2160p", fixtures::HASH_B, "5"),
            ],
        )
        .await;

    let response = fixture
        .post("/api/v1/search", json!({ "query": "sintel", "providers": ["alpha"] }))
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["results"][0]["quality_label"], "2160p");
    assert_eq!(response.body["results"][1]["quality_label"], "720p");
    assert_eq!(fixture.extractor.extract_calls().await.len(), 1);
}

#[tokio::test]
async fn test_search_reports_failed_provider_alongside_results() {
    let fixture = TestFixture::new().await;
    fixture
        .extractor
        .set_offers("alpha", vec![fixtures::offer("Sintel 1080p", fixtures::HASH_A, "10")])
        .await;
    fixture
        .extractor
        .set_error(
            "beta",
            ExtractError::UnexpectedStatus {
                url: "http://beta.example".to_string(),
                status: 404,
            },
        )
        .await;

    let response = fixture
        .post("/api/v1/search", json!({ "query": "sintel" }))
        .await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "total", json!(1));
    assert!(response.body["provider_errors"]["beta"].is_string());
}

#[tokio::test]
async fn test_search_without_results_sets_message() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/search", json!({ "query": "nothing here" }))
        .await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "total", json!(0));
    assert_json_path!(response.body, "message", json!("No results found"));
}

#[tokio::test]
async fn test_search_unknown_provider_is_reported() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/search", json!({ "query": "sintel", "providers": ["gamma"] }))
        .await;

    assert_status!(response, StatusCode::OK);
    assert!(response.body["provider_errors"]["gamma"].is_string());
    assert!(fixture.extractor.extract_calls().await.is_empty());
}

#[tokio::test]
async fn test_search_empty_query_is_bad_request() {
    let fixture = TestFixture::new().await;

    let response = fixture.post("/api/v1/search", json!({ "query": "   " })).await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_search_magnet_query_skips_providers() {
    let fixture = TestFixture::new().await;
    let magnet = fixtures::magnet(fixtures::HASH_B, "Big.Buck.Bunny.1080p.x264", &[]);

    let response = fixture.post("/api/v1/search", json!({ "query": magnet })).await;

    assert_status!(response, StatusCode::OK);
    let result = &response.body["results"][0];
    assert_eq!(result["provider"], "magnet");
    assert_eq!(result["name"], "Big Buck Bunny");
    assert_eq!(result["hash"], fixtures::HASH_B);
    assert!(fixture.extractor.extract_calls().await.is_empty());
}

#[tokio::test]
async fn test_search_malformed_magnet_is_bad_request() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/search", json!({ "query": "magnet:?dn=no-hash" }))
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_flags_cached_results() {
    let fixture = TestFixture::new().await;
    fixture
        .extractor
        .set_offers("alpha", vec![fixtures::offer("Sintel 1080p", fixtures::HASH_A, "10")])
        .await;
    let first = fixture
        .post("/api/v1/search", json!({ "query": "sintel" }))
        .await;
    let record: CacheRecord = serde_json::from_value(json!({
        "original_query": "sintel",
        "name": first.body["results"][0]["name"],
        "magnet": first.body["results"][0]["magnet"],
        "hash": fixtures::HASH_A,
    }))
    .unwrap();
    fixture.cache.save(&record).unwrap();

    let second = fixture
        .post("/api/v1/search", json!({ "query": "sintel" }))
        .await;

    assert_eq!(second.body["results"][0]["cached"], true);
}

#[tokio::test]
async fn test_search_malformed_body_is_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_raw("/api/v1/search", "{not json").await;

    assert!(response.status.is_client_error());
}
