//! Source loading for the gallery.
//!
//! This module provides:
//! - Collaborator traits for the remote store, the static manifest, the
//!   signed-URL service and the project endpoints
//! - `SourceLoader` - Fetches and normalizes records from every source
//! - `SourceEvent` - Insert/patch notifications published by other components

pub mod events;
pub mod http;
pub mod loader;
pub mod manifest;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::models::{CuratedFields, ProjectRecord, Slide};

pub use events::{EventBus, EventReceiver, SourceEvent};
pub use loader::{LoadFilter, LoadStats, SourceBatch, SourceLoader};
pub use manifest::{CuratedEntry, FileManifestSource, HttpManifestSource, Manifest, ManifestEntry};

/// Which rows a listing query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingScope {
    /// Public uploads and saved images of every user.
    Public,
    /// Everything saved by one owner, regardless of visibility.
    Owner(String),
    /// Curated collection rows.
    Curated,
}

/// One row as returned by the remote listing query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoredImage {
    pub id: String,
    pub path: String,
    pub name: Option<String>,
    pub url: Option<String>,
    pub url_expires_at: Option<String>,
    pub bucket: Option<String>,
    pub created_at: Option<String>,
    pub prompt: Option<String>,
    pub ai_prompt: Option<String>,
    pub ai_json_prompt: Option<Value>,
    pub keywords: Vec<String>,
    pub links: Vec<String>,
    pub group_id: Option<String>,
    pub group_index: Option<u32>,
    pub is_public: bool,
    pub curated: Option<CuratedFields>,
}

/// The queryable remote store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Lists image rows in `scope`, newest first.
    async fn list_images(&self, scope: &ListingScope) -> anyhow::Result<Vec<StoredImage>>;

    /// Lists projects in `scope`, newest first.
    async fn list_projects(&self, scope: &ListingScope) -> anyhow::Result<Vec<ProjectRecord>>;

    /// Persists a refreshed signed URL so later loads skip the refresh.
    async fn update_image_url(
        &self,
        id: &str,
        url: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

/// The static bulk manifest.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Collections keyed by name.
    async fn fetch_collections(&self) -> anyhow::Result<Manifest>;

    /// Curated entries used when the store has no curated rows.
    async fn fetch_curated(&self) -> anyhow::Result<Vec<CuratedEntry>> {
        Ok(Vec::new())
    }
}

/// Signed-URL issuance for stored assets.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn issue_url(&self, bucket: &str, path: &str, ttl: Duration) -> anyhow::Result<String>;
}

/// Project detail and slide endpoints, used when a project is opened.
#[async_trait]
pub trait ProjectClient: Send + Sync {
    async fn project(&self, id: &str) -> anyhow::Result<ProjectRecord>;

    async fn slides(&self, id: &str) -> anyhow::Result<Vec<Slide>>;
}
