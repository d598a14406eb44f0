//! Static bulk manifest: collections of images keyed by collection name, plus
//! the curated collection file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::ManifestSource;
use crate::models::{parse_timestamp, CuratedFields, Prompt, RawRecord, SourceKind, Visibility};

/// Collections keyed by name. Ordered so normalization is deterministic.
pub type Manifest = BTreeMap<String, Vec<ManifestEntry>>;

/// One image entry of a manifest collection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: Option<String>,
    pub group_id: Option<String>,
    pub group_index: Option<u32>,
    pub path: String,
    pub prompt: Value,
    pub keywords: Vec<String>,
    pub links: Vec<String>,
    #[serde(alias = "createdAt", alias = "created_date")]
    pub created_date: Option<String>,
}

/// One curated entry; all of its paths belong to the same group.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CuratedEntry {
    pub id: String,
    pub prompt: Value,
    pub paths: Vec<String>,
    #[serde(alias = "createdAt")]
    pub created_date: Option<String>,
    pub links: Vec<String>,
    #[serde(alias = "tweetIds")]
    pub external_ids: Vec<String>,
    pub authors: Vec<String>,
    pub search_queries: Vec<String>,
    pub search_strategies: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CuratedFile {
    curated: Option<Vec<CuratedEntry>>,
    pensieve_curated: Option<Vec<CuratedEntry>>,
    x_search: Option<Vec<CuratedEntry>>,
}

impl CuratedFile {
    /// First list present, in key priority order.
    fn into_entries(self) -> Vec<CuratedEntry> {
        self.curated
            .or(self.pensieve_curated)
            .or(self.x_search)
            .unwrap_or_default()
    }
}

impl ManifestEntry {
    /// Normalizes into a record listed under `collection`.
    pub fn to_record(&self, collection: &str) -> RawRecord {
        let created_at = self
            .created_date
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(DateTime::UNIX_EPOCH);

        let mut record = RawRecord::new(&self.path, created_at, SourceKind::Manifest)
            .with_collection(collection)
            .with_visibility(Visibility::Public);
        record.id = self.id.clone();
        record.group_id = self.group_id.clone();
        record.group_index = self.group_index;
        record.prompt = Prompt::from_value(self.prompt.clone());
        record.keywords = self.keywords.clone();
        record.links = self.links.clone();
        record
    }
}

impl CuratedEntry {
    /// Expands into one record per path, all sharing the entry id as group id
    /// and ordered by their position in `paths`.
    pub fn to_records(&self, collection: &str) -> Vec<RawRecord> {
        let created_at = self
            .created_date
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(DateTime::UNIX_EPOCH);
        let curated = CuratedFields {
            authors: self.authors.clone(),
            search_queries: self.search_queries.clone(),
            search_strategies: self.search_strategies.clone(),
            external_ids: self.external_ids.clone(),
        };

        self.paths
            .iter()
            .enumerate()
            .map(|(index, path)| {
                let mut record = RawRecord::new(path, created_at, SourceKind::Manifest)
                    .with_group(&self.id, Some(index as u32))
                    .with_collection(collection);
                record.prompt = Prompt::from_value(self.prompt.clone());
                record.links = self.links.clone();
                record.curated = (!curated.is_empty()).then(|| curated.clone());
                record
            })
            .collect()
    }
}

/// Flattens every collection into records tagged with their collection name.
pub fn normalize_manifest(manifest: &Manifest) -> Vec<RawRecord> {
    manifest
        .iter()
        .flat_map(|(collection, entries)| entries.iter().map(|e| e.to_record(collection)))
        .collect()
}

pub fn parse_manifest(text: &str) -> Result<Manifest> {
    serde_json::from_str(text).context("Failed to parse manifest")
}

pub fn parse_curated(text: &str) -> Result<Vec<CuratedEntry>> {
    let file: CuratedFile = serde_json::from_str(text).context("Failed to parse curated manifest")?;
    Ok(file.into_entries())
}

/// Manifest read from local JSON files.
pub struct FileManifestSource {
    collections: PathBuf,
    curated: Option<PathBuf>,
}

impl FileManifestSource {
    pub fn new(collections: impl Into<PathBuf>) -> Self {
        Self {
            collections: collections.into(),
            curated: None,
        }
    }

    pub fn with_curated(mut self, path: impl Into<PathBuf>) -> Self {
        self.curated = Some(path.into());
        self
    }
}

#[async_trait]
impl ManifestSource for FileManifestSource {
    async fn fetch_collections(&self) -> Result<Manifest> {
        let text = tokio::fs::read_to_string(&self.collections)
            .await
            .with_context(|| format!("Failed to read manifest {:?}", self.collections))?;
        let manifest = parse_manifest(&text)?;
        debug!(
            "Read {} manifest collections from {:?}",
            manifest.len(),
            self.collections
        );
        Ok(manifest)
    }

    async fn fetch_curated(&self) -> Result<Vec<CuratedEntry>> {
        let Some(path) = &self.curated else {
            return Ok(Vec::new());
        };
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read curated manifest {:?}", path))?;
        parse_curated(&text)
    }
}

/// Manifest fetched over HTTP.
pub struct HttpManifestSource {
    client: reqwest::Client,
    collections_url: String,
    curated_url: Option<String>,
}

impl HttpManifestSource {
    pub fn new(client: reqwest::Client, collections_url: impl Into<String>) -> Self {
        Self {
            client,
            collections_url: collections_url.into(),
            curated_url: None,
        }
    }

    pub fn with_curated(mut self, url: impl Into<String>) -> Self {
        self.curated_url = Some(url.into());
        self
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch_collections(&self) -> Result<Manifest> {
        let text = self.get_text(&self.collections_url).await?;
        parse_manifest(&text)
    }

    async fn fetch_curated(&self) -> Result<Vec<CuratedEntry>> {
        match &self.curated_url {
            Some(url) => parse_curated(&self.get_text(url).await?),
            None => Ok(Vec::new()),
        }
    }
}
