//! The cache coordinator.
//!
//! Reads resolve from the metadata store first; a precise miss triggers the
//! matching sync against upstream and a re-read. Each sync key — provider,
//! provider/version, or provider/version/os/arch — is held by at most one
//! synchronizer; concurrent callers sleep briefly and re-read, because the
//! state they need is the database row, not the gate.

use crate::error::{MirrorError, MirrorResult};
use crate::upstream::RegistryClient;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use terrapin_core::config::SyncConfig;
use terrapin_core::{PlatformData, PlatformKey, ProviderRef, VersionData};
use terrapin_metadata::{ProviderStore, StoreError};
use tokio::task::JoinSet;

/// How long a reader waits before re-reading while another caller is
/// syncing the key it missed on.
const RETRY_WAIT: Duration = Duration::from_millis(500);

/// How many of the newest versions get their platforms refreshed in the
/// background after a version listing sync.
const SWEEP_VERSIONS: usize = 10;

/// Providers per worker during a full resync.
const RESYNC_BATCH: usize = 10;

/// Coordinates reads and writes across the metadata store and upstream
/// registries.
#[derive(Clone)]
pub struct MirrorService {
    store: Arc<ProviderStore>,
    registry: RegistryClient,
    syncing: Arc<DashMap<String, ()>>,
    sweep_timeout: Duration,
}

impl MirrorService {
    pub fn new(store: Arc<ProviderStore>, registry: RegistryClient, config: &SyncConfig) -> Self {
        Self {
            store,
            registry,
            syncing: Arc::new(DashMap::new()),
            sweep_timeout: config.platform_sweep_timeout(),
        }
    }

    pub fn store(&self) -> &Arc<ProviderStore> {
        &self.store
    }

    /// All known versions of a provider, demand-filling from upstream on
    /// first sight.
    pub async fn get_versions(&self, r: &ProviderRef) -> MirrorResult<Vec<VersionData>> {
        loop {
            match self.store.get_versions(r) {
                Ok(blobs) => {
                    return blobs
                        .iter()
                        .map(|blob| VersionData::from_json(blob).map_err(corrupt))
                        .collect();
                }
                Err(StoreError::ProviderNotFound) => {
                    if self.is_syncing(&r.path()) {
                        tokio::time::sleep(RETRY_WAIT).await;
                        continue;
                    }
                    self.sync_versions(r).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// One version with the full descriptor of every platform it declares,
    /// materializing missing platform rows from upstream.
    pub async fn get_version(
        &self,
        r: &ProviderRef,
        version: &str,
    ) -> MirrorResult<Vec<PlatformData>> {
        loop {
            match self.store.get_version(r, version) {
                Ok((_, platforms)) => {
                    return platforms
                        .iter()
                        .map(|blob| PlatformData::from_json(blob).map_err(corrupt))
                        .collect();
                }
                Err(StoreError::ProviderNotFound) => {
                    if self.is_syncing(&r.path()) {
                        tokio::time::sleep(RETRY_WAIT).await;
                        continue;
                    }
                    self.sync_versions(r).await?;
                }
                Err(StoreError::PlatformsIncomplete) => {
                    let key = format!("{}/{version}", r.path());
                    if self.is_syncing(&key) {
                        tokio::time::sleep(RETRY_WAIT).await;
                        continue;
                    }
                    self.sync_platforms(r, version).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// One platform descriptor, materializing it from upstream on miss.
    pub async fn get_platform(
        &self,
        r: &ProviderRef,
        version: &str,
        os: &str,
        arch: &str,
    ) -> MirrorResult<PlatformData> {
        let platform = PlatformKey {
            os: os.to_string(),
            arch: arch.to_string(),
        };

        loop {
            match self.store.get_platform(r, version, os, arch) {
                Ok(blob) => return PlatformData::from_json(&blob).map_err(corrupt),
                Err(StoreError::ProviderNotFound) => {
                    if self.is_syncing(&r.path()) {
                        tokio::time::sleep(RETRY_WAIT).await;
                        continue;
                    }
                    self.sync_versions(r).await?;
                }
                Err(StoreError::PlatformNotFound) => {
                    let key = format!("{}/{version}/{}", r.path(), platform.path());
                    if self.is_syncing(&key) {
                        tokio::time::sleep(RETRY_WAIT).await;
                        continue;
                    }
                    self.sync_platform(r, version, &platform).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Refresh the version listing of one provider.
    ///
    /// Returns immediately when another caller already holds this key. On
    /// success, a detached task refreshes the platforms of the newest
    /// versions under a bounded budget.
    pub async fn sync_versions(&self, r: &ProviderRef) -> MirrorResult<()> {
        let Some(_guard) = self.try_acquire(&r.path()) else {
            return Ok(());
        };

        let since = self.store.get_modified(r)?;
        let base = self.registry.provider_base(&r.hostname).await?;
        let body = self
            .registry
            .list_versions(&base, &r.namespace, &r.type_name, since)
            .await?;

        let Some(body) = body else {
            // Not modified; keep the conditional window moving.
            self.store.touch_provider(r)?;
            return Ok(());
        };

        let doc: serde_json::Value = serde_json::from_slice(&body)?;
        let mut entries = Vec::new();
        if let Some(items) = doc.get("versions").and_then(|v| v.as_array()) {
            for item in items {
                let Some(version) = item.get("version").and_then(|v| v.as_str()) else {
                    continue;
                };
                if version.is_empty() {
                    continue;
                }
                entries.push((version.to_string(), serde_json::to_vec(item)?));
            }
        }

        if entries.is_empty() {
            self.store.touch_provider(r)?;
            return Ok(());
        }

        self.store.upsert_versions(r, &entries)?;

        // Sweep the newest versions' platforms off the request path.
        let versions: Vec<String> = entries.into_iter().map(|(v, _)| v).collect();
        let newest = newest_versions(&versions, SWEEP_VERSIONS);
        let service = self.clone();
        let r = r.clone();
        let budget = self.sweep_timeout;
        tokio::spawn(async move {
            let swept = tokio::time::timeout(budget, async {
                for version in &newest {
                    match service.sync_platforms(&r, version).await {
                        Ok(()) => {
                            tracing::debug!(provider = %r, version, "synced platforms");
                        }
                        Err(e) => {
                            tracing::error!(provider = %r, version, error = %e, "error syncing platforms");
                        }
                    }
                }
            })
            .await;

            if swept.is_err() {
                tracing::warn!(provider = %r, "platform sweep exceeded its budget");
            }
        });

        Ok(())
    }

    /// Refresh every platform one stored version declares, concurrently.
    ///
    /// Platforms fail independently; successes commit and the first failure
    /// is reported once the whole fan-out has finished.
    pub async fn sync_platforms(&self, r: &ProviderRef, version: &str) -> MirrorResult<()> {
        let key = format!("{}/{version}", r.path());
        let Some(_guard) = self.try_acquire(&key) else {
            return Ok(());
        };

        let Some(data) = self.store.get_version_data(r, version)? else {
            return Ok(());
        };

        let mut platforms = VersionData::from_json(&data)
            .map(|v| v.platforms)
            .unwrap_or_default();
        if platforms.is_empty() {
            return Ok(());
        }
        platforms.sort();

        let mut tasks = JoinSet::new();
        for platform in platforms {
            let service = self.clone();
            let r = r.clone();
            let version = version.to_string();
            tasks.spawn(async move {
                let result = service.sync_platform(&r, &version, &platform).await;
                (platform, result)
            });
        }

        let mut first_err = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((platform, Err(e))) => {
                    tracing::error!(provider = %r, version, platform = %platform, error = %e, "error syncing platform");
                    first_err.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!(provider = %r, version, error = %e, "platform sync task failed");
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Refresh one platform descriptor.
    pub async fn sync_platform(
        &self,
        r: &ProviderRef,
        version: &str,
        platform: &PlatformKey,
    ) -> MirrorResult<()> {
        let key = format!("{}/{version}/{}", r.path(), platform.path());
        let Some(_guard) = self.try_acquire(&key) else {
            return Ok(());
        };

        let since = self.store.get_platform_modified(r, version, platform)?;
        let base = self.registry.provider_base(&r.hostname).await?;
        let body = self
            .registry
            .get_platform(
                &base,
                &r.namespace,
                &r.type_name,
                version,
                &platform.os,
                &platform.arch,
                since,
            )
            .await?;

        self.store
            .upsert_platform(r, version, platform, body.as_deref())?;

        Ok(())
    }

    /// Re-run the version sync over every provider the mirror has seen.
    ///
    /// Providers are processed in batches of ten; one provider's failure
    /// does not stop the rest, and the first failure is reported at the
    /// end.
    pub async fn resync(&self) -> MirrorResult<()> {
        let refs = self.store.list_provider_refs()?;
        if refs.is_empty() {
            return Ok(());
        }

        tracing::info!(providers = refs.len(), "resyncing provider metadata");

        let mut tasks = JoinSet::new();
        for batch in refs.chunks(RESYNC_BATCH) {
            let service = self.clone();
            let batch = batch.to_vec();
            tasks.spawn(async move {
                let mut first_err = None;
                for r in &batch {
                    if let Err(e) = service.sync_versions(r).await {
                        tracing::error!(provider = %r, error = %e, "error syncing versions");
                        first_err.get_or_insert(e);
                    }
                }
                first_err
            });
        }

        let mut first_err = None;
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(e)) = joined {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn is_syncing(&self, key: &str) -> bool {
        self.syncing.contains_key(key)
    }

    /// Take the sync slot for a key, or `None` when a synchronizer already
    /// holds it.
    fn try_acquire(&self, key: &str) -> Option<SyncGuard> {
        match self.syncing.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Some(SyncGuard {
                    map: self.syncing.clone(),
                    key: key.to_string(),
                })
            }
        }
    }
}

/// Releases a sync slot, whatever the outcome.
struct SyncGuard {
    map: Arc<DashMap<String, ()>>,
    key: String,
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

fn corrupt(e: terrapin_core::Error) -> MirrorError {
    StoreError::Corrupt(e.to_string()).into()
}

/// The newest `limit` versions in descending semver order. Versions that do
/// not parse as semver sort after every parseable one and are excluded.
fn newest_versions(versions: &[String], limit: usize) -> Vec<String> {
    let mut parsed: Vec<(Option<semver::Version>, &String)> = versions
        .iter()
        .map(|v| (semver::Version::parse(v).ok(), v))
        .collect();

    parsed.sort_by(|a, b| match (&a.0, &b.0) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    parsed
        .into_iter()
        .filter(|(parsed, _)| parsed.is_some())
        .take(limit)
        .map(|(_, v)| v.clone())
        .collect()
}
