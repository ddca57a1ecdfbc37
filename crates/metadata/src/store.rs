//! The embedded provider metadata store.

use crate::error::{StoreError, StoreResult};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::{Path, PathBuf};
use terrapin_core::{PlatformKey, ProviderRef, VersionData};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Provider families: slash-joined address -> `modified` RFC3339 timestamp
/// of the last successful upstream version listing.
const PROVIDERS: TableDefinition<&str, &str> = TableDefinition::new("providers");

/// Version listings: (address, version) -> raw upstream JSON object.
const VERSIONS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("versions");

/// Platform descriptors: (address, version, "os/arch") ->
/// (`modified` RFC3339, raw upstream JSON object). An empty payload marks a
/// row that was touched by a conditional refresh before any content landed;
/// readers treat it as absent.
const PLATFORMS: TableDefinition<(&str, &str, &str), (&str, &[u8])> =
    TableDefinition::new("platforms");

/// Upper bound for prefix range scans over string-keyed tuples.
const KEY_MAX: &str = "\u{10ffff}";

/// Aggregate store statistics for observability.
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreStats {
    pub providers: u64,
    pub versions: u64,
    pub platforms: u64,
    pub file_size_bytes: u64,
}

/// Durable, transactional key/value view over the provider namespace.
///
/// Writes are serialized by the database's single writer; snapshot reads are
/// never blocked by a writer. Every byte slice handed out is an owned copy.
pub struct ProviderStore {
    db: Database,
    path: PathBuf,
}

impl ProviderStore {
    /// Open (or create) the store at the given file path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&path)?;

        // Materialize all tables up front so readers never race table creation.
        let txn = db.begin_write()?;
        {
            txn.open_table(PROVIDERS)?;
            txn.open_table(VERSIONS)?;
            txn.open_table(PLATFORMS)?;
        }
        txn.commit()?;

        Ok(Self { db, path })
    }

    /// The `modified` timestamp of the provider's last version listing, if
    /// the provider is known. Unparseable timestamps read as absent.
    pub fn get_modified(&self, r: &ProviderRef) -> StoreResult<Option<OffsetDateTime>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PROVIDERS)?;

        let modified = table
            .get(r.path().as_str())?
            .and_then(|guard| OffsetDateTime::parse(guard.value(), &Rfc3339).ok());

        Ok(modified)
    }

    /// All stored version records of a provider, as raw JSON blobs.
    ///
    /// Returns `ProviderNotFound` when the provider has never been synced;
    /// a synced provider with no versions yields an empty list.
    pub fn get_versions(&self, r: &ProviderRef) -> StoreResult<Vec<Vec<u8>>> {
        let path = r.path();
        let txn = self.db.begin_read()?;

        let providers = txn.open_table(PROVIDERS)?;
        if providers.get(path.as_str())?.is_none() {
            return Err(StoreError::ProviderNotFound);
        }

        let versions = txn.open_table(VERSIONS)?;
        let mut out = Vec::new();
        for item in versions.range((path.as_str(), "")..=(path.as_str(), KEY_MAX))? {
            let (_, value) = item?;
            out.push(value.value().to_vec());
        }

        Ok(out)
    }

    /// One version record plus the stored descriptor of every platform it
    /// declares, sorted by (os, arch).
    ///
    /// Returns `PlatformsIncomplete` when the listing exists but some
    /// declared platform row was never materialized.
    pub fn get_version(
        &self,
        r: &ProviderRef,
        version: &str,
    ) -> StoreResult<(Vec<u8>, Vec<Vec<u8>>)> {
        let path = r.path();
        let txn = self.db.begin_read()?;

        let providers = txn.open_table(PROVIDERS)?;
        if providers.get(path.as_str())?.is_none() {
            return Err(StoreError::ProviderNotFound);
        }

        let versions = txn.open_table(VERSIONS)?;
        let data = versions
            .get((path.as_str(), version))?
            .ok_or(StoreError::VersionNotFound)?
            .value()
            .to_vec();

        let mut declared = VersionData::from_json(&data)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?
            .platforms;
        declared.sort();

        let platforms = txn.open_table(PLATFORMS)?;
        let mut out = Vec::with_capacity(declared.len());
        for key in &declared {
            let platform_path = key.path();
            let Some(guard) = platforms.get((path.as_str(), version, platform_path.as_str()))?
            else {
                return Err(StoreError::PlatformsIncomplete);
            };

            let (_, blob) = guard.value();
            if blob.is_empty() {
                return Err(StoreError::PlatformsIncomplete);
            }
            out.push(blob.to_vec());
        }

        Ok((data, out))
    }

    /// The raw version record alone, without materializing platforms.
    /// Absent provider or version rows read as `None`.
    pub fn get_version_data(
        &self,
        r: &ProviderRef,
        version: &str,
    ) -> StoreResult<Option<Vec<u8>>> {
        let path = r.path();
        let txn = self.db.begin_read()?;

        let versions = txn.open_table(VERSIONS)?;
        let data = versions
            .get((path.as_str(), version))?
            .map(|guard| guard.value().to_vec());

        Ok(data)
    }

    /// The stored descriptor of one platform, as a raw JSON blob.
    pub fn get_platform(
        &self,
        r: &ProviderRef,
        version: &str,
        os: &str,
        arch: &str,
    ) -> StoreResult<Vec<u8>> {
        let path = r.path();
        let platform_path = format!("{os}/{arch}");
        let txn = self.db.begin_read()?;

        let providers = txn.open_table(PROVIDERS)?;
        if providers.get(path.as_str())?.is_none() {
            return Err(StoreError::ProviderNotFound);
        }

        let versions = txn.open_table(VERSIONS)?;
        if versions.get((path.as_str(), version))?.is_none() {
            return Err(StoreError::VersionNotFound);
        }

        let platforms = txn.open_table(PLATFORMS)?;
        let guard = platforms
            .get((path.as_str(), version, platform_path.as_str()))?
            .ok_or(StoreError::PlatformNotFound)?;

        let (_, blob) = guard.value();
        if blob.is_empty() {
            return Err(StoreError::PlatformNotFound);
        }

        Ok(blob.to_vec())
    }

    /// The `modified` timestamp of one platform row, if present.
    pub fn get_platform_modified(
        &self,
        r: &ProviderRef,
        version: &str,
        key: &PlatformKey,
    ) -> StoreResult<Option<OffsetDateTime>> {
        let path = r.path();
        let platform_path = key.path();
        let txn = self.db.begin_read()?;

        let platforms = txn.open_table(PLATFORMS)?;
        let modified = platforms
            .get((path.as_str(), version, platform_path.as_str()))?
            .and_then(|guard| OffsetDateTime::parse(guard.value().0, &Rfc3339).ok());

        Ok(modified)
    }

    /// Replace the version rows of a provider and refresh its `modified`
    /// timestamp, all in one transaction.
    pub fn upsert_versions(
        &self,
        r: &ProviderRef,
        entries: &[(String, Vec<u8>)],
    ) -> StoreResult<()> {
        let path = r.path();
        let now = rfc3339_now();

        let txn = self.db.begin_write()?;
        {
            let mut versions = txn.open_table(VERSIONS)?;
            for (version, data) in entries {
                versions.insert((path.as_str(), version.as_str()), data.as_slice())?;
            }

            let mut providers = txn.open_table(PROVIDERS)?;
            providers.insert(path.as_str(), now.as_str())?;
        }
        txn.commit()?;

        Ok(())
    }

    /// Refresh a provider's `modified` timestamp without touching content.
    /// Used after a `304 Not Modified` so conditional requests stay effective.
    pub fn touch_provider(&self, r: &ProviderRef) -> StoreResult<()> {
        let path = r.path();
        let now = rfc3339_now();

        let txn = self.db.begin_write()?;
        {
            let mut providers = txn.open_table(PROVIDERS)?;
            providers.insert(path.as_str(), now.as_str())?;
        }
        txn.commit()?;

        Ok(())
    }

    /// Write (or touch, when `data` is `None`) one platform row.
    ///
    /// A platform row may only exist under an existing version row; when the
    /// version is gone the write is skipped and `false` is returned.
    pub fn upsert_platform(
        &self,
        r: &ProviderRef,
        version: &str,
        key: &PlatformKey,
        data: Option<&[u8]>,
    ) -> StoreResult<bool> {
        let path = r.path();
        let platform_path = key.path();
        let now = rfc3339_now();

        let txn = self.db.begin_write()?;
        let written = {
            let versions = txn.open_table(VERSIONS)?;
            if versions.get((path.as_str(), version))?.is_none() {
                false
            } else {
                let mut platforms = txn.open_table(PLATFORMS)?;
                let blob = match data {
                    Some(blob) => blob.to_vec(),
                    // Timestamp-only refresh keeps whatever content is there.
                    None => platforms
                        .get((path.as_str(), version, platform_path.as_str()))?
                        .map(|guard| guard.value().1.to_vec())
                        .unwrap_or_default(),
                };

                platforms.insert(
                    (path.as_str(), version, platform_path.as_str()),
                    (now.as_str(), blob.as_slice()),
                )?;
                true
            }
        };
        txn.commit()?;

        Ok(written)
    }

    /// Every provider family the mirror has seen, for the scheduler.
    pub fn list_provider_refs(&self) -> StoreResult<Vec<ProviderRef>> {
        let txn = self.db.begin_read()?;
        let providers = txn.open_table(PROVIDERS)?;

        let mut out = Vec::new();
        for item in providers.iter()? {
            let (key, _) = item?;
            match ProviderRef::from_path(key.value()) {
                Ok(r) => out.push(r),
                Err(_) => {
                    tracing::warn!(key = %key.value(), "skipping malformed provider key");
                }
            }
        }

        Ok(out)
    }

    /// Aggregate statistics for observability.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let txn = self.db.begin_read()?;
        let providers = txn.open_table(PROVIDERS)?.len()?;
        let versions = txn.open_table(VERSIONS)?.len()?;
        let platforms = txn.open_table(PLATFORMS)?.len()?;

        let file_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);

        Ok(StoreStats {
            providers,
            versions,
            platforms,
            file_size_bytes,
        })
    }

    /// Verify the database can serve a snapshot read.
    pub fn health_check(&self) -> StoreResult<()> {
        let txn = self.db.begin_read()?;
        txn.open_table(PROVIDERS)?;
        Ok(())
    }
}

fn rfc3339_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("RFC3339 formatting of the current time")
}
