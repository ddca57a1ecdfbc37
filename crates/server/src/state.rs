//! Application state shared across handlers.

use std::path::PathBuf;
use std::sync::Arc;
use terrapin_core::AppConfig;
use terrapin_mirror::MirrorService;
use terrapin_storage::ArchiveStore;
use tokio::sync::Mutex;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata cache coordinator.
    pub mirror: MirrorService,
    /// Archive store.
    pub archives: Arc<ArchiveStore>,
    /// Single-flight lock for the manual sync endpoint.
    pub sync_lock: Arc<Mutex<()>>,
    /// Archive tree root, checked by the readiness probe.
    pub providers_dir: PathBuf,
}

impl AppState {
    pub fn new(config: AppConfig, mirror: MirrorService, archives: Arc<ArchiveStore>) -> Self {
        let providers_dir = config.storage.providers_dir();

        Self {
            config: Arc::new(config),
            mirror,
            archives,
            sync_lock: Arc::new(Mutex::new(())),
            providers_dir,
        }
    }
}
