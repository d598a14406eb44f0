//! HTTP collaborators: signed-URL issuance and the project endpoints.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;
use tracing::trace;

use super::{ProjectClient, UrlSigner};
use crate::models::{parse_timestamp, ProjectRecord, Slide, Visibility};

/// Request timeout for every collaborator call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Builds the shared client used by the HTTP collaborators.
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("gallery-engine/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

/// Issues signed URLs from an object storage endpoint
/// (`POST {base}/object/sign/{bucket}/{path}`).
pub struct HttpUrlSigner {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(alias = "signedURL", alias = "signed_url")]
    #[serde(rename = "signedUrl")]
    signed_url: String,
}

impl HttpUrlSigner {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The service may answer with a path relative to its base.
    fn absolutize(&self, signed: String) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            signed
        } else {
            format!("{}/{}", self.base_url, signed.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl UrlSigner for HttpUrlSigner {
    async fn issue_url(&self, bucket: &str, path: &str, ttl: Duration) -> Result<String> {
        let url = format!(
            "{}/object/sign/{}/{}",
            self.base_url,
            bucket,
            path.trim_start_matches('/')
        );
        trace!("Signing {}", url);

        let response: SignedUrlResponse = self
            .client
            .post(&url)
            .json(&json!({ "expiresIn": ttl.as_secs() }))
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?
            .error_for_status()?
            .json()
            .await
            .context("Malformed signed url response")?;

        if response.signed_url.is_empty() {
            return Err(anyhow!("empty signed url for {bucket}/{path}"));
        }
        Ok(self.absolutize(response.signed_url))
    }
}

/// Project row as served by the project endpoints.
#[derive(Deserialize)]
struct ProjectWire {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    slide_count: u32,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    is_public: bool,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

impl From<ProjectWire> for ProjectRecord {
    fn from(wire: ProjectWire) -> Self {
        let created_at = wire
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(DateTime::UNIX_EPOCH);
        let updated_at = wire
            .updated_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(created_at);
        Self {
            id: wire.id,
            name: wire.name,
            prompt: wire.prompt,
            slide_count: wire.slide_count,
            created_at,
            updated_at,
            visibility: Visibility::from_flag(wire.is_public),
            thumbnail_url: wire.thumbnail_url,
        }
    }
}

#[derive(Deserialize)]
struct ProjectResponse {
    project: ProjectWire,
}

#[derive(Deserialize)]
struct SlidesResponse {
    #[serde(default)]
    slides: Vec<Slide>,
}

/// Project detail endpoints (`GET {base}/projects/{id}` and `/slides`).
pub struct HttpProjectClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProjectClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("Malformed response from {url}"))
    }
}

#[async_trait]
impl ProjectClient for HttpProjectClient {
    async fn project(&self, id: &str) -> Result<ProjectRecord> {
        let url = format!("{}/projects/{}", self.base_url, id);
        let response: ProjectResponse = self.get_json(&url).await?;
        Ok(response.project.into())
    }

    async fn slides(&self, id: &str) -> Result<Vec<Slide>> {
        let url = format!("{}/projects/{}/slides", self.base_url, id);
        let response: SlidesResponse = self.get_json(&url).await?;
        Ok(response.slides)
    }
}
