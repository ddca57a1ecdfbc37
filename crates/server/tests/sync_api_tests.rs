//! Integration tests for the manual sync endpoint.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::TestServer;
use httpmock::Method::GET;
use serde_json::json;
use std::time::Duration;
use terrapin_core::ProviderRef;
use tower::ServiceExt;

async fn put(router: &axum::Router, uri: &str) -> StatusCode {
    let request = Request::builder()
        .method("PUT")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    response.status()
}

#[tokio::test]
async fn sync_enumerates_known_providers() {
    let server = TestServer::new();
    server.mock_discovery();

    let versions = server.upstream.mock(|when, then| {
        when.method(GET).path("/v1/providers/hashicorp/random/versions");
        then.status(200).json_body(json!({
            "versions": [{"version": "3.6.0", "platforms": []}]
        }));
    });

    // Seed a known provider family without going through the HTTP surface.
    let r = ProviderRef::new(server.provider_host(), "hashicorp", "random").unwrap();
    server.state.mirror.store().touch_provider(&r).unwrap();

    let status = put(&server.router, "/v1/providers/sync").await;
    assert_eq!(status, StatusCode::OK);

    // The sweep runs detached from the request; wait for it to reach
    // upstream.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if versions.hits() >= 1 {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("sync did not reach upstream in time");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn concurrent_sync_is_rejected_with_locked() {
    let server = TestServer::new();

    // Hold the single-flight lock as a running sync would.
    let guard = server.state.sync_lock.clone().try_lock_owned().unwrap();

    let status = put(&server.router, "/v1/providers/sync").await;
    assert_eq!(status, StatusCode::LOCKED);

    drop(guard);

    let status = put(&server.router, "/v1/providers/sync").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn sync_accepts_a_timeout_budget() {
    let server = TestServer::new();

    let status = put(&server.router, "/v1/providers/sync?timeout=90s").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn sync_rejects_a_malformed_timeout() {
    let server = TestServer::new();

    let status = put(&server.router, "/v1/providers/sync?timeout=soon").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
