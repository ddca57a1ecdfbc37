//! Health probes, metrics and version endpoints.

use crate::metrics;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use serde_json::json;

/// Run the registered health checks: the metadata store serves snapshot
/// reads and the archive tree is a directory.
fn check_health(state: &AppState) -> Result<(), &'static str> {
    if let Err(e) = state.mirror.store().health_check() {
        tracing::warn!(error = %e, "metadata store unhealthy");
        return Err("metadata store unavailable");
    }

    match std::fs::metadata(&state.providers_dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        _ => {
            tracing::warn!(dir = %state.providers_dir.display(), "archive tree unhealthy");
            Err("archive storage unavailable")
        }
    }
}

/// GET /livez - process liveness.
pub async fn livez(State(state): State<AppState>) -> impl IntoResponse {
    match check_health(&state) {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
    }
}

/// GET /readyz - readiness to serve mirror traffic.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match check_health(&state) {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
    }
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    // Refresh the database gauges at scrape time.
    match state.mirror.store().stats() {
        Ok(stats) => {
            metrics::DB_PROVIDERS.set(stats.providers as i64);
            metrics::DB_VERSIONS.set(stats.versions as i64);
            metrics::DB_PLATFORMS.set(stats.platforms as i64);
            metrics::DB_FILE_SIZE.set(stats.file_size_bytes as i64);
        }
        Err(e) => tracing::warn!(error = %e, "failed to collect store stats"),
    }

    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

/// GET /debug/version - product and version.
pub async fn version() -> impl IntoResponse {
    axum::Json(json!({
        "name": terrapin_core::PRODUCT,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
