//! Upstream provider registry client.
//!
//! Implements the read side of the provider registry protocol: service
//! discovery via `/.well-known/terraform.json`, version listings and
//! platform descriptors, both with `If-Modified-Since` conditional support.
//!
//! Malformed success responses degrade to known-empty payloads
//! (`{"versions":[]}`, `{}`) rather than errors, so callers can tell
//! "upstream says there is nothing" apart from "upstream is unreachable".

use crate::error::MirrorResult;
use reqwest::StatusCode;
use reqwest::header::IF_MODIFIED_SINCE;
use std::collections::HashMap;
use terrapin_core::config::UpstreamConfig;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use url::Url;

/// Empty version listing substituted for malformed listing responses.
const EMPTY_VERSIONS: &[u8] = br#"{"versions":[]}"#;

/// Empty platform descriptor substituted for malformed descriptor responses.
const EMPTY_PLATFORM: &[u8] = b"{}";

/// Upstream registry HTTP client.
///
/// TLS verification is configurable and off by default so corporate
/// intercepting proxies do not break the mirror; archive integrity rests on
/// the recorded shasum instead.
#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    scheme: String,
}

impl RegistryClient {
    pub fn new(config: &UpstreamConfig) -> MirrorResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(terrapin_core::USER_AGENT)
            .connect_timeout(config.connect_timeout())
            .pool_idle_timeout(config.idle_timeout())
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .build()?;

        Ok(Self {
            http,
            scheme: "https".to_string(),
        })
    }

    /// Override the upstream URL scheme. Tests point this at plain-HTTP
    /// mock registries.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// The underlying HTTP client, shared with the archive downloader.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Resolve the provider service base URL for a host.
    ///
    /// The two well-known public registries short-circuit to their
    /// documented base; anything else goes through discovery.
    pub async fn provider_base(&self, host: &str) -> MirrorResult<Url> {
        match host {
            "registry.terraform.io" | "registry.opentofu.org" => {
                Ok(Url::parse(&format!("{}://{host}/v1/providers/", self.scheme))?)
            }
            _ => self.discover(host, "providers.v1").await,
        }
    }

    /// Fetch `/.well-known/terraform.json` and resolve the URL listed under
    /// `service`. Any failure degrades to the bare host base; later
    /// requests against it will fail and bubble up.
    pub async fn discover(&self, host: &str, service: &str) -> MirrorResult<Url> {
        let base = Url::parse(&format!("{}://{host}/", self.scheme))?;
        let well_known = base.join("/.well-known/terraform.json")?;

        let resolved = async {
            let resp = self.http.get(well_known).send().await.ok()?;
            let doc: HashMap<String, String> = resp.json().await.ok()?;
            let target = doc.get(service).filter(|v| !v.is_empty())?;
            base.join(target).ok()
        }
        .await;

        Ok(resolved.unwrap_or(base))
    }

    /// Fetch the version listing of a provider.
    ///
    /// Returns `None` on `304 Not Modified` when `since` was sent.
    pub async fn list_versions(
        &self,
        base: &Url,
        namespace: &str,
        type_name: &str,
        since: Option<OffsetDateTime>,
    ) -> MirrorResult<Option<Vec<u8>>> {
        let url = base.join(&format!("{namespace}/{type_name}/versions"))?;

        let mut req = self.http.get(url);
        if let Some(since) = since {
            req = req.header(IF_MODIFIED_SINCE, http_date(since));
        }

        let resp = req.send().await?;
        if since.is_some() && resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }

        let body = resp.bytes().await?;
        let valid = serde_json::from_slice::<serde_json::Value>(&body)
            .map(|doc| doc.get("versions").is_some_and(|v| v.is_array()))
            .unwrap_or(false);

        if valid {
            Ok(Some(body.to_vec()))
        } else {
            Ok(Some(EMPTY_VERSIONS.to_vec()))
        }
    }

    /// Fetch the platform descriptor of one provider release.
    ///
    /// Returns `None` on `304 Not Modified` when `since` was sent.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_platform(
        &self,
        base: &Url,
        namespace: &str,
        type_name: &str,
        version: &str,
        os: &str,
        arch: &str,
        since: Option<OffsetDateTime>,
    ) -> MirrorResult<Option<Vec<u8>>> {
        let url = base.join(&format!(
            "{namespace}/{type_name}/{version}/download/{os}/{arch}"
        ))?;

        let mut req = self.http.get(url);
        if let Some(since) = since {
            req = req.header(IF_MODIFIED_SINCE, http_date(since));
        }

        let resp = req.send().await?;
        if since.is_some() && resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }

        let body = resp.bytes().await?;
        let valid = serde_json::from_slice::<serde_json::Value>(&body)
            .map(|doc| doc.is_object())
            .unwrap_or(false);

        if valid {
            Ok(Some(body.to_vec()))
        } else {
            Ok(Some(EMPTY_PLATFORM.to_vec()))
        }
    }
}

/// Format a timestamp as an IMF-fixdate HTTP date, e.g.
/// `Sun, 06 Nov 1994 08:49:37 GMT`.
fn http_date(t: OffsetDateTime) -> String {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );

    t.to_offset(UtcOffset::UTC)
        .format(&format)
        .expect("HTTP date formatting")
}
