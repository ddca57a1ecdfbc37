//! Server test utilities.

use httpmock::Method::GET;
use httpmock::MockServer;
use std::sync::Arc;
use tempfile::TempDir;
use terrapin_core::AppConfig;
use terrapin_metadata::ProviderStore;
use terrapin_mirror::{MirrorService, RegistryClient};
use terrapin_server::{AppState, create_router};
use terrapin_storage::{ArchiveStore, DownloadClient};

/// A test server wrapper with a mock upstream registry.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub upstream: MockServer,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage and a fresh mock
    /// upstream.
    pub fn new() -> Self {
        terrapin_server::metrics::register_metrics();

        let temp_dir = tempfile::tempdir().expect("failed to create temp directory");
        let upstream = MockServer::start();

        let config = AppConfig::for_testing(temp_dir.path());

        let store = Arc::new(
            ProviderStore::open(config.storage.metadata_path())
                .expect("failed to open metadata store"),
        );
        let registry = RegistryClient::new(&config.upstream)
            .expect("failed to build registry client")
            .with_scheme("http");
        let downloader = DownloadClient::new(registry.http().clone()).with_parallelism(1);
        let archives = Arc::new(
            ArchiveStore::new(config.storage.providers_dir(), None, downloader)
                .expect("failed to initialize archive store"),
        );
        let mirror = MirrorService::new(store, registry, &config.sync);

        let state = AppState::new(config, mirror, archives);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            upstream,
            _temp_dir: temp_dir,
        }
    }

    /// The hostname clients use to address providers on the mock upstream.
    pub fn provider_host(&self) -> String {
        self.upstream.address().to_string()
    }

    /// Mock upstream service discovery pointing at `/v1/providers/`.
    pub fn mock_discovery(&self) {
        self.upstream.mock(|when, then| {
            when.method(GET).path("/.well-known/terraform.json");
            then.status(200)
                .json_body(serde_json::json!({"providers.v1": "/v1/providers/"}));
        });
    }
}
