//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl AppConfig {
    /// Create a test configuration rooted at the given directory.
    ///
    /// **For testing only.**
    pub fn for_testing(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                data_dir: data_dir.into(),
                implied_dir: None,
            },
            ..Default::default()
        }
    }
}

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// On-disk layout configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding the metadata database and the archive tree.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Optional operator-curated read-only archive tree, consulted before
    /// the mirror-managed one and served without hash verification.
    /// Falls back to the `TF_PLUGIN_MIRROR_DIR` environment variable.
    #[serde(default)]
    pub implied_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Path of the embedded metadata database file.
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join("metadata.db")
    }

    /// Root of the mirror-managed archive tree.
    pub fn providers_dir(&self) -> PathBuf {
        self.data_dir.join("data").join("providers")
    }

    /// Resolve the implied directory from config or environment.
    pub fn resolve_implied_dir(&self) -> Option<PathBuf> {
        if self.implied_dir.is_some() {
            return self.implied_dir.clone();
        }

        std::env::var("TF_PLUGIN_MIRROR_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            implied_dir: None,
        }
    }
}

/// Synchronization configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Interval between periodic full resyncs, in seconds.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    /// Default budget for a manually triggered sync, in seconds.
    #[serde(default = "default_manual_sync_timeout_secs")]
    pub manual_sync_timeout_secs: u64,
    /// Budget for the background top-versions platform sweep, in seconds.
    #[serde(default = "default_platform_sweep_timeout_secs")]
    pub platform_sweep_timeout_secs: u64,
}

impl SyncConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn manual_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.manual_sync_timeout_secs)
    }

    pub fn platform_sweep_timeout(&self) -> Duration {
        Duration::from_secs(self.platform_sweep_timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: default_resync_interval_secs(),
            manual_sync_timeout_secs: default_manual_sync_timeout_secs(),
            platform_sweep_timeout_secs: default_platform_sweep_timeout_secs(),
        }
    }
}

/// Upstream HTTP client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Skip TLS certificate verification when talking to upstream
    /// registries. Archive integrity is anchored on the recorded shasum,
    /// not on the transport.
    #[serde(default = "default_skip_tls_verify")]
    pub skip_tls_verify: bool,
    /// Connection establishment timeout, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle pooled connection timeout, in seconds.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            skip_tls_verify: default_skip_tls_verify(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/terrapin")
}

fn default_resync_interval_secs() -> u64 {
    30 * 60
}

fn default_manual_sync_timeout_secs() -> u64 {
    2 * 60
}

fn default_platform_sweep_timeout_secs() -> u64 {
    5 * 60
}

fn default_skip_tls_verify() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    90
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.sync.resync_interval(), Duration::from_secs(1800));
        assert_eq!(
            config.sync.manual_sync_timeout(),
            Duration::from_secs(120)
        );
        assert!(config.upstream.skip_tls_verify);
    }

    #[test]
    fn storage_paths_derive_from_data_dir() {
        let config = AppConfig::for_testing("/tmp/mirror");
        assert_eq!(
            config.storage.metadata_path(),
            PathBuf::from("/tmp/mirror/metadata.db")
        );
        assert_eq!(
            config.storage.providers_dir(),
            PathBuf::from("/tmp/mirror/data/providers")
        );
    }
}
