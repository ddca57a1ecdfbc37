//! Mirror protocol endpoints.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use terrapin_core::{ArchiveName, ProviderRef, parse_duration};
use terrapin_storage::LoadArchiveOptions;

/// Response of the metadata endpoints. A version index carries `versions`,
/// a version detail carries `archives`.
#[derive(Debug, Serialize)]
pub struct GetMetadataResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions: Option<BTreeMap<String, Empty>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archives: Option<BTreeMap<String, ArchiveEntry>>,
}

/// The mirror protocol lists versions as keys with empty objects.
#[derive(Debug, Serialize)]
pub struct Empty {}

/// One downloadable archive in a version detail response.
#[derive(Debug, Serialize)]
pub struct ArchiveEntry {
    pub url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hashes: Vec<String>,
}

/// GET /v1/providers/{hostname}/{namespace}/{type}/{action}
///
/// `index.json` lists known versions; `<version>.json` lists the archives
/// of one version.
pub async fn get_metadata(
    State(state): State<AppState>,
    Path((hostname, namespace, type_name, action)): Path<(String, String, String, String)>,
) -> ApiResult<Json<GetMetadataResponse>> {
    if action.len() <= 5 {
        return Err(ApiError::BadRequest("invalid action".to_string()));
    }
    let version = action
        .strip_suffix(".json")
        .ok_or_else(|| ApiError::BadRequest("invalid action".to_string()))?;

    let r = ProviderRef::new(hostname, namespace, type_name)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if version == "index" {
        metrics::MIRROR_REQUESTS.with_label_values(&["index"]).inc();

        let versions = state.mirror.get_versions(&r).await?;
        let versions = versions
            .into_iter()
            .map(|v| (v.version, Empty {}))
            .collect();

        return Ok(Json(GetMetadataResponse {
            versions: Some(versions),
            archives: None,
        }));
    }

    metrics::MIRROR_REQUESTS.with_label_values(&["version"]).inc();

    let platforms = state.mirror.get_version(&r, version).await?;
    let mut archives = BTreeMap::new();
    for p in platforms {
        let mut entry = ArchiveEntry {
            url: format!("download/{}", p.filename),
            hashes: Vec::new(),
        };
        if !p.shasum.is_empty() {
            entry.hashes.push(format!("zh:{}", p.shasum));
        }

        archives.insert(format!("{}_{}", p.os, p.arch), entry);
    }

    Ok(Json(GetMetadataResponse {
        versions: None,
        archives: Some(archives),
    }))
}

/// GET /v1/providers/{hostname}/{namespace}/{type}/download/{archive}
///
/// Streams the archive, pulling it through from upstream when the mirror
/// does not hold it yet. The archive name must carry the standard release
/// form and agree with the path's provider type.
pub async fn download_archive(
    State(state): State<AppState>,
    Path((hostname, namespace, type_name, archive)): Path<(String, String, String, String)>,
) -> ApiResult<Response> {
    let name =
        ArchiveName::parse(&archive).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if name.type_name != type_name {
        return Err(ApiError::BadRequest(
            "archive type does not match the path".to_string(),
        ));
    }

    let r = ProviderRef::new(hostname, namespace, type_name)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    metrics::MIRROR_REQUESTS.with_label_values(&["download"]).inc();

    let platform = state
        .mirror
        .get_platform(&r, &name.version, &name.os, &name.arch)
        .await?;

    let loaded = state
        .archives
        .load(&LoadArchiveOptions {
            hostname: r.hostname,
            namespace: r.namespace,
            type_name: r.type_name,
            filename: platform.filename,
            shasum: platform.shasum,
            download_url: platform.download_url,
        })
        .await?;

    metrics::ARCHIVE_LOADS.inc();

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, loaded.content_type.to_string()),
            (CONTENT_LENGTH, loaded.content_length.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", loaded.filename),
            ),
        ],
        Body::from_stream(loaded.body),
    )
        .into_response())
}

/// Query parameters of the manual sync endpoint.
#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    /// Budget for the sweep, e.g. `90s` or `5m`.
    pub timeout: Option<String>,
}

/// PUT /v1/providers/sync
///
/// Triggers a full metadata resync in the background and returns
/// immediately. The sweep runs detached from the request context, which is
/// cancelled as soon as the response is written, on its own bounded budget.
/// Rejected with 423 while a previous sync is still running.
pub async fn sync_metadata(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
) -> ApiResult<StatusCode> {
    let timeout = match &query.timeout {
        Some(raw) => parse_duration(raw).map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => state.config.sync.manual_sync_timeout(),
    };

    let Ok(guard) = state.sync_lock.clone().try_lock_owned() else {
        metrics::MANUAL_SYNCS_REJECTED.inc();
        return Err(ApiError::Locked("previous sync is not finished".to_string()));
    };

    metrics::MANUAL_SYNCS.inc();
    metrics::MIRROR_REQUESTS.with_label_values(&["sync"]).inc();

    let mirror = state.mirror.clone();
    tokio::spawn(async move {
        let _guard = guard;

        match tokio::time::timeout(timeout, mirror.resync()).await {
            Ok(Ok(())) => tracing::info!("manual sync finished"),
            Ok(Err(e)) => tracing::warn!(error = %e, "manual sync failed"),
            Err(_) => tracing::warn!(timeout_secs = timeout.as_secs(), "manual sync timed out"),
        }
    });

    Ok(StatusCode::OK)
}
