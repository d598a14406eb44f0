//! In-memory collaborators shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::engagement::{Metric, MetricsClient};
use crate::models::{ProjectRecord, RawRecord, Slide, SourceKind, TargetKind, Visibility};
use crate::source::{
    CuratedEntry, ListingScope, Manifest, ManifestSource, ProjectClient, RecordStore, StoredImage,
    UrlSigner,
};

pub fn stored(id: &str, path: &str, created_at: &str) -> StoredImage {
    StoredImage {
        id: id.to_string(),
        path: path.to_string(),
        created_at: Some(created_at.to_string()),
        is_public: true,
        ..Default::default()
    }
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::days(days)
}

pub fn project(id: &str, age_days: i64) -> ProjectRecord {
    let created_at = days_ago(age_days);
    ProjectRecord {
        id: id.to_string(),
        name: format!("Project {id}"),
        prompt: None,
        slide_count: 3,
        created_at,
        updated_at: created_at,
        visibility: Visibility::Public,
        thumbnail_url: None,
    }
}

pub fn record(id: &str, path: &str, created_at: DateTime<Utc>) -> RawRecord {
    RawRecord::new(path, created_at, SourceKind::Remote)
        .with_id(id)
        .with_collection("public")
}

#[derive(Default)]
pub struct MemoryStore {
    pub public: Vec<StoredImage>,
    pub owned: HashMap<String, Vec<StoredImage>>,
    pub curated: Vec<StoredImage>,
    pub projects: Vec<ProjectRecord>,
    pub fail_listing: bool,
    pub fail_projects: bool,
    /// Applied to the public listing only, so a public load can be
    /// overtaken by a later owner load.
    pub delay: Option<Duration>,
    pub fail_url_updates: bool,
    pub listing_calls: AtomicUsize,
    pub url_updates: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_images(&self, scope: &ListingScope) -> Result<Vec<StoredImage>> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if *scope == ListingScope::Curated {
            return Ok(self.curated.clone());
        }
        if let (ListingScope::Public, Some(delay)) = (scope, self.delay) {
            tokio::time::sleep(delay).await;
        }
        if self.fail_listing {
            return Err(anyhow!("listing unavailable"));
        }
        Ok(match scope {
            ListingScope::Public => self.public.clone(),
            ListingScope::Owner(owner) => self.owned.get(owner).cloned().unwrap_or_default(),
            ListingScope::Curated => Vec::new(),
        })
    }

    async fn list_projects(&self, _scope: &ListingScope) -> Result<Vec<ProjectRecord>> {
        if self.fail_projects {
            return Err(anyhow!("projects unavailable"));
        }
        Ok(self.projects.clone())
    }

    async fn update_image_url(&self, id: &str, url: &str, _expires_at: DateTime<Utc>) -> Result<()> {
        if self.fail_url_updates {
            return Err(anyhow!("store is read-only"));
        }
        self.url_updates.lock().push((id.to_string(), url.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryManifest {
    pub collections: Manifest,
    pub curated: Vec<CuratedEntry>,
    pub fail: bool,
}

#[async_trait]
impl ManifestSource for MemoryManifest {
    async fn fetch_collections(&self) -> Result<Manifest> {
        if self.fail {
            return Err(anyhow!("manifest unavailable"));
        }
        Ok(self.collections.clone())
    }

    async fn fetch_curated(&self) -> Result<Vec<CuratedEntry>> {
        Ok(self.curated.clone())
    }
}

#[derive(Default)]
pub struct StaticSigner {
    pub fail_paths: HashSet<String>,
    pub calls: AtomicUsize,
}

impl StaticSigner {
    pub fn failing<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            fail_paths: paths.into_iter().map(str::to_string).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl UrlSigner for StaticSigner {
    async fn issue_url(&self, bucket: &str, path: &str, _ttl: Duration) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_paths.contains(path) {
            return Err(anyhow!("signing refused for {path}"));
        }
        Ok(format!("https://signed/{bucket}/{path}"))
    }
}

/// Serves fixed counts and records every request it receives.
#[derive(Default)]
pub struct CountingMetrics {
    pub counts: HashMap<(Metric, String), u64>,
    pub requests: Mutex<Vec<(Metric, TargetKind, Vec<String>)>>,
    pub fail: AtomicBool,
}

impl CountingMetrics {
    pub fn with_count(mut self, metric: Metric, id: &str, count: u64) -> Self {
        self.counts.insert((metric, id.to_string()), count);
        self
    }

    pub fn requested_ids(&self, metric: Metric) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter(|(m, _, _)| *m == metric)
            .flat_map(|(_, _, ids)| ids.clone())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl MetricsClient for CountingMetrics {
    async fn fetch_batch(
        &self,
        metric: Metric,
        kind: TargetKind,
        ids: &[String],
    ) -> Result<HashMap<String, u64>> {
        self.requests.lock().push((metric, kind, ids.to_vec()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("metrics unavailable"));
        }
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.counts
                    .get(&(metric, id.clone()))
                    .map(|count| (id.clone(), *count))
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryProjects {
    pub projects: HashMap<String, (ProjectRecord, Vec<Slide>)>,
    pub calls: AtomicUsize,
}

impl MemoryProjects {
    pub fn with_project(mut self, project: ProjectRecord, slides: Vec<Slide>) -> Self {
        self.projects.insert(project.id.clone(), (project, slides));
        self
    }
}

#[async_trait]
impl ProjectClient for MemoryProjects {
    async fn project(&self, id: &str) -> Result<ProjectRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.projects
            .get(id)
            .map(|(project, _)| project.clone())
            .ok_or_else(|| anyhow!("no project {id}"))
    }

    async fn slides(&self, id: &str) -> Result<Vec<Slide>> {
        self.projects
            .get(id)
            .map(|(_, slides)| slides.clone())
            .ok_or_else(|| anyhow!("no project {id}"))
    }
}
