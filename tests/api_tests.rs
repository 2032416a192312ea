//! API surface tests: manifest, health, CORS, and request validation.

mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::Value;

#[tokio::test]
async fn test_manifest_shape() {
    let app = TestApp::spawn(|_| {}).await;

    let response = app.server.get("/manifest.json").await;
    response.assert_status_ok();
    let body: Value = response.json();

    assert_eq!(body["id"], "com.barestreams.addon");
    assert_eq!(body["resources"], serde_json::json!(["stream"]));
    assert_eq!(body["types"], serde_json::json!(["movie", "series"]));
    assert_eq!(body["idPrefixes"], serde_json::json!(["tt"]));
    assert_eq!(body["catalogs"], serde_json::json!([]));
    assert_eq!(body["behaviorHints"]["p2p"], serde_json::json!(true));
    assert!(body["version"].as_str().is_some());
}

#[tokio::test]
async fn test_cors_headers() {
    let app = TestApp::spawn(|_| {}).await;

    let response = app.server.get("/manifest.json").await;
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn test_options_returns_no_content() {
    let app = TestApp::spawn(|_| {}).await;

    let response = app
        .server
        .method(Method::OPTIONS, "/stream/movie/tt10872600.json")
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::spawn(|_| {}).await;

    let response = app.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["message"].as_str().unwrap().contains("running"));
}

#[tokio::test]
async fn test_unknown_type_is_bad_request() {
    let app = TestApp::spawn(|_| {}).await;

    let response = app.server.get("/stream/music/tt10872600.json").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_malformed_ids_are_bad_requests() {
    let app = TestApp::spawn(|_| {}).await;

    for id in ["123", "tt123:0:1", "tt123:1:-2", "tt123:1", "tt123:1:2:3", "TT123"] {
        let response = app.server.get(&format!("/stream/movie/{}.json", id)).await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_valid_request_with_no_scrapers_is_empty() {
    let app = TestApp::spawn(|_| {}).await;

    let response = app.server.get("/stream/movie/tt10872600.json").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["streams"], serde_json::json!([]));
}
