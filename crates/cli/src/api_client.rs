use anyhow::{Context, Result};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Thin client for a running mirror's HTTP surface.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
pub struct VersionIndex {
    #[serde(default)]
    pub versions: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ServerVersion {
    pub name: String,
    pub version: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    /// Trigger a full metadata sync. A 423 means one is already running.
    pub async fn sync(&self, timeout: Option<&str>) -> Result<()> {
        let mut url = self.url("/v1/providers/sync")?;
        if let Some(timeout) = timeout {
            url.query_pairs_mut().append_pair("timeout", timeout);
        }

        let response = self.http.put(url).send().await?;
        let status = response.status();
        if status == StatusCode::LOCKED {
            anyhow::bail!("a previous sync is still running");
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("sync request failed ({status}): {body}");
        }

        Ok(())
    }

    /// List the known versions of one provider.
    pub async fn versions(
        &self,
        hostname: &str,
        namespace: &str,
        type_name: &str,
    ) -> Result<Vec<String>> {
        let url = self.url(&format!(
            "/v1/providers/{hostname}/{namespace}/{type_name}/index.json"
        ))?;

        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("version listing failed ({status}): {body}");
        }

        let index: VersionIndex = serde_json::from_str(&body)?;
        Ok(index.versions.into_keys().collect())
    }

    /// Check the mirror's readiness probe.
    pub async fn health(&self) -> Result<()> {
        let url = self.url("/readyz")?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("mirror not ready ({status}): {body}");
        }

        Ok(())
    }

    /// Fetch the server's product name and version.
    pub async fn server_version(&self) -> Result<ServerVersion> {
        let url = self.url("/debug/version")?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("version request failed ({status}): {body}");
        }

        Ok(serde_json::from_str(&body)?)
    }
}
