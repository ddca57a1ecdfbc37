//! Provider addressing and typed views over upstream registry payloads.
//!
//! Upstream metadata is persisted as the raw JSON the registry returned;
//! the structs here are lenient typed views used where the mirror needs to
//! look inside a payload (declared platforms, download coordinates). Fields
//! the mirror never inspects (signing keys, shasums URLs) ride along in the
//! stored bytes untouched.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The (hostname, namespace, type) triple identifying a provider family.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderRef {
    pub hostname: String,
    pub namespace: String,
    pub type_name: String,
}

impl ProviderRef {
    /// Create a provider reference, rejecting empty segments.
    pub fn new(
        hostname: impl Into<String>,
        namespace: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Result<Self> {
        let r = Self {
            hostname: hostname.into(),
            namespace: namespace.into(),
            type_name: type_name.into(),
        };

        if r.hostname.is_empty() || r.namespace.is_empty() || r.type_name.is_empty() {
            return Err(Error::InvalidProviderRef(r.to_string()));
        }

        if r.hostname.contains('/') || r.namespace.contains('/') || r.type_name.contains('/') {
            return Err(Error::InvalidProviderRef(r.to_string()));
        }

        Ok(r)
    }

    /// The slash-joined storage path of this provider, `host/namespace/type`.
    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.hostname, self.namespace, self.type_name)
    }

    /// Parse a slash-joined storage path back into a reference.
    pub fn from_path(path: &str) -> Result<Self> {
        let mut parts = path.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(n), Some(t)) => Self::new(h, n, t),
            _ => Err(Error::InvalidProviderRef(path.to_string())),
        }
    }
}

impl fmt::Display for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.hostname, self.namespace, self.type_name)
    }
}

/// An (os, arch) pair as declared in a version listing.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlatformKey {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
}

impl PlatformKey {
    /// The slash-joined storage path of this platform, `os/arch`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.os, self.arch)
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}

/// Typed view of one element of an upstream version listing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VersionData {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<PlatformKey>,
}

impl VersionData {
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// Typed view of an upstream platform descriptor.
///
/// Every field defaults so that the empty-object placeholder stored for a
/// malformed upstream response still parses; a record without a
/// `download_url` is unusable for fetching and surfaces as such downstream.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlatformData {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub shasum: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub protocols: Vec<String>,
}

impl PlatformData {
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_ref_path_roundtrip() {
        let r = ProviderRef::new("registry.terraform.io", "hashicorp", "random").unwrap();
        assert_eq!(r.path(), "registry.terraform.io/hashicorp/random");
        assert_eq!(ProviderRef::from_path(&r.path()).unwrap(), r);
    }

    #[test]
    fn provider_ref_rejects_empty_segments() {
        assert!(ProviderRef::new("", "hashicorp", "random").is_err());
        assert!(ProviderRef::new("registry.terraform.io", "", "random").is_err());
        assert!(ProviderRef::new("registry.terraform.io", "hashicorp", "").is_err());
    }

    #[test]
    fn provider_ref_rejects_slashes() {
        assert!(ProviderRef::new("a/b", "c", "d").is_err());
        assert!(ProviderRef::from_path("only/two").is_err());
    }

    #[test]
    fn version_data_tolerates_missing_fields() {
        let v = VersionData::from_json(br#"{"version":"3.6.0"}"#).unwrap();
        assert_eq!(v.version, "3.6.0");
        assert!(v.platforms.is_empty());

        let v = VersionData::from_json(
            br#"{"version":"2.0.0","protocols":["5.0"],"platforms":[{"os":"linux","arch":"amd64"}]}"#,
        )
        .unwrap();
        assert_eq!(v.platforms[0].path(), "linux/amd64");
    }

    #[test]
    fn platform_data_parses_empty_object() {
        let p = PlatformData::from_json(b"{}").unwrap();
        assert!(p.download_url.is_empty());
        assert!(p.shasum.is_empty());
    }
}
