//! Prometheus metrics for the Terrapin server.
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping
//! and should be network-restricted at the infrastructure level when the
//! mirror faces untrusted clients.

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Mirror protocol requests by operation (index, version, download, sync).
pub static MIRROR_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "terrapin_mirror_requests_total",
            "Mirror protocol requests served, by operation",
        ),
        &["operation"],
    )
    .expect("metric creation failed")
});

/// Archives streamed to clients.
pub static ARCHIVE_LOADS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "terrapin_archive_loads_total",
        "Archive downloads served to clients",
    )
    .expect("metric creation failed")
});

/// Manual syncs accepted via the HTTP endpoint.
pub static MANUAL_SYNCS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "terrapin_manual_syncs_total",
        "Manual metadata syncs accepted",
    )
    .expect("metric creation failed")
});

/// Manual syncs rejected because one was already running.
pub static MANUAL_SYNCS_REJECTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "terrapin_manual_syncs_rejected_total",
        "Manual metadata syncs rejected while one was running",
    )
    .expect("metric creation failed")
});

/// Provider families in the metadata store.
pub static DB_PROVIDERS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "terrapin_metadata_providers",
        "Provider families in the metadata store",
    )
    .expect("metric creation failed")
});

/// Version rows in the metadata store.
pub static DB_VERSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "terrapin_metadata_versions",
        "Version records in the metadata store",
    )
    .expect("metric creation failed")
});

/// Platform rows in the metadata store.
pub static DB_PLATFORMS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "terrapin_metadata_platforms",
        "Platform records in the metadata store",
    )
    .expect("metric creation failed")
});

/// Metadata database file size in bytes.
pub static DB_FILE_SIZE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "terrapin_metadata_file_size_bytes",
        "Metadata database file size in bytes",
    )
    .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(MIRROR_REQUESTS.clone()))
            .expect("register mirror requests");
        REGISTRY
            .register(Box::new(ARCHIVE_LOADS.clone()))
            .expect("register archive loads");
        REGISTRY
            .register(Box::new(MANUAL_SYNCS.clone()))
            .expect("register manual syncs");
        REGISTRY
            .register(Box::new(MANUAL_SYNCS_REJECTED.clone()))
            .expect("register manual syncs rejected");
        REGISTRY
            .register(Box::new(DB_PROVIDERS.clone()))
            .expect("register db providers");
        REGISTRY
            .register(Box::new(DB_VERSIONS.clone()))
            .expect("register db versions");
        REGISTRY
            .register(Box::new(DB_PLATFORMS.clone()))
            .expect("register db platforms");
        REGISTRY
            .register(Box::new(DB_FILE_SIZE.clone()))
            .expect("register db file size");
    });
}

/// Render the registry in Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buf) {
        tracing::error!(error = %e, "failed to encode metrics");
    }
    String::from_utf8(buf).unwrap_or_default()
}
