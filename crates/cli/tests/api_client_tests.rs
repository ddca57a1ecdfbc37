#[path = "../src/api_client.rs"]
#[allow(dead_code)] // Some methods are used by the binary but not by tests
mod api_client;

use api_client::ApiClient;
use httpmock::Method::{GET, PUT};
use httpmock::MockServer;
use serde_json::json;

#[tokio::test]
async fn sync_hits_the_sync_endpoint() {
    let server = MockServer::start();
    let sync = server.mock(|when, then| {
        when.method(PUT)
            .path("/v1/providers/sync")
            .query_param("timeout", "90s");
        then.status(200);
    });

    let client = ApiClient::new(&server.base_url()).unwrap();
    client.sync(Some("90s")).await.unwrap();
    sync.assert();
}

#[tokio::test]
async fn sync_surfaces_the_locked_conflict() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(PUT).path("/v1/providers/sync");
        then.status(423)
            .json_body(json!({"code": "locked", "message": "locked: previous sync is not finished"}));
    });

    let client = ApiClient::new(&server.base_url()).unwrap();
    let err = client.sync(None).await.unwrap_err();
    assert!(err.to_string().contains("still running"));
}

#[tokio::test]
async fn versions_parses_the_index_keys() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/v1/providers/registry.terraform.io/hashicorp/random/index.json");
        then.status(200)
            .json_body(json!({"versions": {"3.5.1": {}, "3.6.0": {}}}));
    });

    let client = ApiClient::new(&server.base_url()).unwrap();
    let versions = client
        .versions("registry.terraform.io", "hashicorp", "random")
        .await
        .unwrap();
    assert_eq!(versions, vec!["3.5.1".to_string(), "3.6.0".to_string()]);
}

#[tokio::test]
async fn versions_surfaces_error_bodies() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/v1/providers/registry.terraform.io/hashicorp/random/index.json");
        then.status(502)
            .json_body(json!({"code": "upstream_unavailable", "message": "upstream request failed"}));
    });

    let client = ApiClient::new(&server.base_url()).unwrap();
    let err = client
        .versions("registry.terraform.io", "hashicorp", "random")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("502"));
}

#[tokio::test]
async fn health_and_version_round_trip() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/readyz");
        then.status(200).body("ok");
    });
    server.mock(|when, then| {
        when.method(GET).path("/debug/version");
        then.status(200)
            .json_body(json!({"name": "terrapin", "version": "0.1.0"}));
    });

    let client = ApiClient::new(&server.base_url()).unwrap();
    client.health().await.unwrap();

    let version = client.server_version().await.unwrap();
    assert_eq!(version.name, "terrapin");
    assert_eq!(version.version, "0.1.0");
}

#[tokio::test]
async fn health_fails_when_not_ready() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/readyz");
        then.status(503).body("metadata store unavailable");
    });

    let client = ApiClient::new(&server.base_url()).unwrap();
    let err = client.health().await.unwrap_err();
    assert!(err.to_string().contains("not ready"));
}
