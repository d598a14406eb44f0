//! Source loading.
//!
//! Fetches the remote listing, projects, the static manifest and the curated
//! collection concurrently, normalizes everything into `RawRecord`s and
//! refreshes expired signed URLs before handing the batch to the grouper.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use super::manifest::{normalize_manifest, CuratedEntry};
use super::{ListingScope, ManifestSource, RecordStore, StoredImage, UrlSigner};
use crate::config::SourceConfig;
use crate::error::{GalleryError, Result};
use crate::models::{parse_timestamp, ProjectRecord, Prompt, RawRecord, SourceKind, Visibility};

pub const PUBLIC_COLLECTION: &str = "public";
pub const SAVED_COLLECTION: &str = "saved";
pub const CURATED_COLLECTION: &str = "curated";

/// Which surface a load is for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadFilter {
    /// Public feed: every user's public images plus public projects.
    pub public_only: bool,
    /// Owner of the personal library. Ignored for the public feed.
    pub owner: Option<String>,
}

impl LoadFilter {
    pub fn public() -> Self {
        Self {
            public_only: true,
            owner: None,
        }
    }

    pub fn owner(owner: impl Into<String>) -> Self {
        Self {
            public_only: false,
            owner: Some(owner.into()),
        }
    }

    fn listing_scope(&self) -> Option<ListingScope> {
        if self.public_only {
            Some(ListingScope::Public)
        } else {
            self.owner.clone().map(ListingScope::Owner)
        }
    }

    fn collection(&self) -> &'static str {
        if self.public_only {
            PUBLIC_COLLECTION
        } else {
            SAVED_COLLECTION
        }
    }
}

/// Counters for one load, logged and exposed to the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub remote: usize,
    pub manifest: usize,
    pub curated: usize,
    pub projects: usize,
    pub refreshed: usize,
    pub refresh_failed: usize,
}

/// Everything one load produced, ready for grouping.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub records: Vec<RawRecord>,
    pub projects: Vec<ProjectRecord>,
    pub stats: LoadStats,
}

/// Fetches and normalizes records from every configured source.
pub struct SourceLoader {
    store: Arc<dyn RecordStore>,
    manifest: Option<Arc<dyn ManifestSource>>,
    signer: Option<Arc<dyn UrlSigner>>,
    config: SourceConfig,
}

impl SourceLoader {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            manifest: None,
            signer: None,
            config: SourceConfig::default(),
        }
    }

    pub fn with_manifest(mut self, manifest: Arc<dyn ManifestSource>) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn UrlSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_config(mut self, config: SourceConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads one batch. Only a failing primary listing fails the load; every
    /// other source degrades to empty with a warning.
    pub async fn load(&self, filter: &LoadFilter) -> Result<SourceBatch> {
        let now = Utc::now();

        let (listing, projects, manifest, curated) = tokio::join!(
            self.fetch_listing(filter),
            self.fetch_projects(filter),
            self.fetch_manifest(),
            self.fetch_curated(),
        );

        let listing = listing.map_err(|e| {
            warn!("Primary listing failed: {:#}", e);
            GalleryError::source_unavailable(&e)
        })?;

        let collection = filter.collection();
        let mut records: Vec<RawRecord> = listing
            .into_iter()
            .map(|image| normalize_stored(image, collection))
            .collect();
        let remote = records.len();
        let curated_len = curated.len();
        records.extend(curated);

        // Stored curated rows carry signed urls too; manifest records are skipped.
        let (refreshed, refresh_failed) = self.refresh_urls(&mut records, now).await;

        let stats = LoadStats {
            remote,
            manifest: manifest.len(),
            curated: curated_len,
            projects: projects.len(),
            refreshed,
            refresh_failed,
        };
        info!(
            remote = stats.remote,
            manifest = stats.manifest,
            curated = stats.curated,
            projects = stats.projects,
            refreshed = stats.refreshed,
            "Loaded gallery sources"
        );

        records.extend(manifest);

        Ok(SourceBatch {
            records,
            projects,
            stats,
        })
    }

    async fn fetch_listing(&self, filter: &LoadFilter) -> anyhow::Result<Vec<StoredImage>> {
        match filter.listing_scope() {
            Some(scope) => self.store.list_images(&scope).await,
            None => {
                debug!("Private load without an owner, skipping listing");
                Ok(Vec::new())
            }
        }
    }

    /// Projects only appear in the public feed.
    async fn fetch_projects(&self, filter: &LoadFilter) -> Vec<ProjectRecord> {
        if !filter.public_only {
            return Vec::new();
        }
        match self.store.list_projects(&ListingScope::Public).await {
            Ok(projects) => projects,
            Err(e) => {
                warn!("Failed to load projects: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn fetch_manifest(&self) -> Vec<RawRecord> {
        let Some(manifest) = &self.manifest else {
            return Vec::new();
        };
        match manifest.fetch_collections().await {
            Ok(collections) => normalize_manifest(&collections),
            Err(e) => {
                warn!("Failed to load manifest: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Curated rows from the store, falling back to the curated manifest when
    /// the store has none.
    async fn fetch_curated(&self) -> Vec<RawRecord> {
        let stored = match self.store.list_images(&ListingScope::Curated).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Failed to load curated rows: {:#}", e);
                Vec::new()
            }
        };

        let records = if !stored.is_empty() {
            stored
                .into_iter()
                .map(|image| normalize_stored(image, CURATED_COLLECTION))
                .collect()
        } else {
            self.fetch_curated_manifest().await
        };

        self.prune_curated(records)
    }

    async fn fetch_curated_manifest(&self) -> Vec<RawRecord> {
        let Some(manifest) = &self.manifest else {
            return Vec::new();
        };
        match manifest.fetch_curated().await {
            Ok(entries) => entries
                .iter()
                .flat_map(|entry: &CuratedEntry| entry.to_records(CURATED_COLLECTION))
                .collect(),
            Err(e) => {
                warn!("Failed to load curated manifest: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Drops excluded groups and repeated paths.
    fn prune_curated(&self, records: Vec<RawRecord>) -> Vec<RawRecord> {
        let excluded: HashSet<&str> = self
            .config
            .excluded_group_ids
            .iter()
            .map(String::as_str)
            .collect();
        let mut seen = HashSet::new();

        records
            .into_iter()
            .filter(|r| {
                r.group_id
                    .as_deref()
                    .map_or(true, |group| !excluded.contains(group))
            })
            .filter(|r| seen.insert(r.path.clone()))
            .collect()
    }

    /// Re-issues every missing or expired URL concurrently, once per load.
    /// Persisting a new URL is best-effort: a failed write still keeps the
    /// URL on the record. Returns `(refreshed, failed)`.
    async fn refresh_urls(&self, records: &mut [RawRecord], now: DateTime<Utc>) -> (usize, usize) {
        let Some(signer) = &self.signer else {
            return (0, 0);
        };
        let ttl = Duration::from_secs(self.config.url_ttl_secs);
        let expires_at = now + chrono::Duration::seconds(self.config.url_ttl_secs as i64);

        let stale: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.source_kind == SourceKind::Remote && r.needs_url_refresh(now))
            .map(|(i, _)| i)
            .collect();
        if stale.is_empty() {
            return (0, 0);
        }
        debug!("Refreshing {} asset urls", stale.len());

        let attempts = stale.iter().map(|&index| {
            let record = &records[index];
            let bucket = record
                .bucket
                .clone()
                .unwrap_or_else(|| self.config.default_bucket.clone());
            let path = record.path.clone();
            let id = record.id.clone();
            async move {
                let url = signer.issue_url(&bucket, &path, ttl).await?;
                if let Some(id) = &id {
                    if let Err(e) = self.store.update_image_url(id, &url, expires_at).await {
                        warn!("Failed to persist refreshed url for {}: {:#}", path, e);
                    }
                }
                anyhow::Ok(url)
            }
        });
        let results = join_all(attempts).await;

        let mut refreshed = 0;
        let mut failed = 0;
        for (index, result) in stale.into_iter().zip(results) {
            let record = &mut records[index];
            match result {
                Ok(url) => {
                    record.url = Some(url);
                    record.url_expires_at = Some(expires_at);
                    refreshed += 1;
                }
                Err(e) => {
                    let err = GalleryError::AssetRefreshFailed {
                        path: record.path.clone(),
                        reason: format!("{e:#}"),
                    };
                    warn!("{}", err);
                    failed += 1;
                }
            }
        }
        (refreshed, failed)
    }
}

/// Normalizes one stored row. A structured prompt wins over free text.
pub fn normalize_stored(image: StoredImage, collection: &str) -> RawRecord {
    let created_at = image
        .created_at
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(DateTime::UNIX_EPOCH);

    let prompt = image
        .ai_json_prompt
        .and_then(Prompt::from_value)
        .or_else(|| Prompt::from_text(image.prompt))
        .or_else(|| Prompt::from_text(image.ai_prompt));

    let mut record = RawRecord::new(image.path, created_at, SourceKind::Remote)
        .with_collection(collection)
        .with_visibility(Visibility::from_flag(image.is_public));
    if !image.id.is_empty() {
        record.id = Some(image.id);
    }
    if let Some(name) = image.name.filter(|n| !n.is_empty()) {
        record.filename = name;
    }
    record.url = image.url.filter(|u| !u.is_empty());
    record.url_expires_at = image.url_expires_at.as_deref().and_then(parse_timestamp);
    record.bucket = image.bucket;
    record.prompt = prompt;
    record.keywords = image.keywords;
    record.links = image.links;
    record.group_id = image.group_id.filter(|g| !g.is_empty());
    record.group_index = image.group_index;
    record.curated = image.curated.filter(|c| !c.is_empty());
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::manifest::{CuratedEntry, ManifestEntry};
    use crate::testing::{stored, MemoryManifest, MemoryStore, StaticSigner};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn loader(store: MemoryStore) -> (Arc<MemoryStore>, SourceLoader) {
        let store = Arc::new(store);
        (store.clone(), SourceLoader::new(store))
    }

    #[tokio::test]
    async fn test_public_load_merges_sources() {
        let mut manifest = MemoryManifest::default();
        manifest.collections.insert(
            "landscapes".into(),
            vec![ManifestEntry {
                path: "landscapes/a.jpg".into(),
                ..Default::default()
            }],
        );
        let (_, loader) = loader(MemoryStore {
            public: vec![stored("i1", "u/1.png", "2025-01-02T00:00:00Z")],
            projects: vec![crate::testing::project("p1", 3)],
            ..Default::default()
        });
        let loader = loader.with_manifest(Arc::new(manifest));

        let batch = loader.load(&LoadFilter::public()).await.unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].collection, PUBLIC_COLLECTION);
        assert_eq!(batch.records[1].source_kind, SourceKind::Manifest);
        assert_eq!(batch.projects.len(), 1);
        assert_eq!(batch.stats.remote, 1);
        assert_eq!(batch.stats.manifest, 1);
    }

    #[tokio::test]
    async fn test_listing_failure_is_source_unavailable() {
        let (_, loader) = loader(MemoryStore {
            fail_listing: true,
            ..Default::default()
        });
        let err = loader.load(&LoadFilter::public()).await.unwrap_err();
        assert!(matches!(err, GalleryError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_project_and_manifest_failures_degrade() {
        let (_, loader) = loader(MemoryStore {
            public: vec![stored("i1", "u/1.png", "2025-01-02T00:00:00Z")],
            fail_projects: true,
            ..Default::default()
        });
        let loader = loader.with_manifest(Arc::new(MemoryManifest {
            fail: true,
            ..Default::default()
        }));

        let batch = loader.load(&LoadFilter::public()).await.unwrap();
        assert_eq!(batch.records.len(), 1);
        assert!(batch.projects.is_empty());
    }

    #[tokio::test]
    async fn test_private_load_without_owner_is_empty() {
        let (store, loader) = loader(MemoryStore {
            public: vec![stored("i1", "u/1.png", "2025-01-02T00:00:00Z")],
            projects: vec![crate::testing::project("p1", 3)],
            ..Default::default()
        });
        let batch = loader.load(&LoadFilter::default()).await.unwrap();
        assert!(batch.records.is_empty());
        assert!(batch.projects.is_empty());
        // Only the curated listing was queried.
        assert_eq!(store.listing_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_owner_load_tags_saved_and_skips_projects() {
        let mut store = MemoryStore {
            projects: vec![crate::testing::project("p1", 3)],
            ..Default::default()
        };
        store.owned.insert(
            "u1".into(),
            vec![stored("i9", "saved/9.png", "2025-01-05T00:00:00Z")],
        );
        let (_, loader) = loader(store);

        let batch = loader.load(&LoadFilter::owner("u1")).await.unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].collection, SAVED_COLLECTION);
        assert!(batch.projects.is_empty());
    }

    #[tokio::test]
    async fn test_expired_urls_refreshed_once() {
        let mut expired = stored("i1", "u/1.png", "2025-01-02T00:00:00Z");
        expired.url = Some("https://old".into());
        expired.url_expires_at = Some("2000-01-01T00:00:00Z".into());
        let mut fresh = stored("i2", "u/2.png", "2025-01-02T00:00:00Z");
        fresh.url = Some("https://ok".into());
        fresh.url_expires_at = Some("2999-01-01T00:00:00Z".into());
        let missing = stored("i3", "u/3.png", "2025-01-02T00:00:00Z");

        let (store, loader) = loader(MemoryStore {
            public: vec![expired, fresh, missing],
            ..Default::default()
        });
        let signer = Arc::new(StaticSigner::default());
        let loader = loader.with_signer(signer.clone());

        let batch = loader.load(&LoadFilter::public()).await.unwrap();
        assert_eq!(signer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(batch.stats.refreshed, 2);
        assert_eq!(
            batch.records[0].url.as_deref(),
            Some("https://signed/saved-gallery/u/1.png")
        );
        assert_eq!(batch.records[1].url.as_deref(), Some("https://ok"));
        assert!(batch.records[2].url_expires_at.is_some());

        let updates = store.url_updates.lock();
        let ids: Vec<_> = updates.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"i1") && ids.contains(&"i3"));
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_record() {
        let (_, loader) = loader(MemoryStore {
            public: vec![
                stored("i1", "u/bad.png", "2025-01-02T00:00:00Z"),
                stored("i2", "u/good.png", "2025-01-02T00:00:00Z"),
            ],
            ..Default::default()
        });
        let signer = StaticSigner::failing(["u/bad.png"]);
        let loader = loader.with_signer(Arc::new(signer));

        let batch = loader.load(&LoadFilter::public()).await.unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].url, None);
        assert!(batch.records[1].url.is_some());
        assert_eq!(batch.stats.refresh_failed, 1);
    }

    #[tokio::test]
    async fn test_signed_url_kept_when_persist_fails() {
        let (store, loader) = loader(MemoryStore {
            public: vec![stored("i1", "u/1.png", "2025-01-02T00:00:00Z")],
            fail_url_updates: true,
            ..Default::default()
        });
        let loader = loader.with_signer(Arc::new(StaticSigner::default()));

        let batch = loader.load(&LoadFilter::public()).await.unwrap();
        assert_eq!(
            batch.records[0].url.as_deref(),
            Some("https://signed/saved-gallery/u/1.png")
        );
        assert!(batch.records[0].url_expires_at.is_some());
        assert_eq!(batch.stats.refreshed, 1);
        assert_eq!(batch.stats.refresh_failed, 0);
        assert!(store.url_updates.lock().is_empty());
    }

    #[tokio::test]
    async fn test_stored_curated_urls_refreshed() {
        let mut row = stored("c1", "cur/1.jpg", "2025-01-02T00:00:00Z");
        row.url = Some("https://expired".into());
        row.url_expires_at = Some("2000-01-01T00:00:00Z".into());
        let (store, loader) = loader(MemoryStore {
            curated: vec![row],
            ..Default::default()
        });
        let signer = Arc::new(StaticSigner::default());
        let loader = loader.with_signer(signer.clone());

        let batch = loader.load(&LoadFilter::public()).await.unwrap();
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(batch.records[0].collection, CURATED_COLLECTION);
        assert_eq!(
            batch.records[0].url.as_deref(),
            Some("https://signed/saved-gallery/cur/1.jpg")
        );
        assert_eq!(batch.stats.curated, 1);
        assert_eq!(batch.stats.refreshed, 1);
        assert_eq!(store.url_updates.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_manifest_curated_records_not_signed() {
        let manifest = MemoryManifest {
            curated: vec![CuratedEntry {
                id: "c1".into(),
                paths: vec!["cur/1.jpg".into()],
                ..Default::default()
            }],
            ..Default::default()
        };
        let (_, loader) = loader(MemoryStore::default());
        let signer = Arc::new(StaticSigner::default());
        let loader = loader
            .with_manifest(Arc::new(manifest))
            .with_signer(signer.clone());

        let batch = loader.load(&LoadFilter::public()).await.unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_curated_falls_back_to_manifest() {
        let manifest = MemoryManifest {
            curated: vec![
                CuratedEntry {
                    id: "c1".into(),
                    paths: vec!["cur/1.jpg".into(), "cur/2.jpg".into()],
                    ..Default::default()
                },
                CuratedEntry {
                    id: "c2".into(),
                    paths: vec!["cur/1.jpg".into(), "cur/3.jpg".into()],
                    ..Default::default()
                },
                CuratedEntry {
                    id: "blocked".into(),
                    paths: vec!["cur/9.jpg".into()],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let (_, loader) = loader(MemoryStore::default());
        let loader = loader
            .with_manifest(Arc::new(manifest))
            .with_config(SourceConfig {
                excluded_group_ids: vec!["blocked".into()],
                ..Default::default()
            });

        let batch = loader.load(&LoadFilter::public()).await.unwrap();
        let paths: Vec<_> = batch.records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["cur/1.jpg", "cur/2.jpg", "cur/3.jpg"]);
        assert!(batch
            .records
            .iter()
            .all(|r| r.collection == CURATED_COLLECTION));
    }

    #[tokio::test]
    async fn test_stored_curated_rows_win() {
        let mut row = stored("c-row", "cur/x.jpg", "2025-01-01T00:00:00Z");
        row.group_id = Some("c9".into());
        let (_, loader) = loader(MemoryStore {
            curated: vec![row],
            ..Default::default()
        });
        let loader = loader.with_manifest(Arc::new(MemoryManifest {
            curated: vec![CuratedEntry {
                id: "c1".into(),
                paths: vec!["cur/1.jpg".into()],
                ..Default::default()
            }],
            ..Default::default()
        }));

        let batch = loader.load(&LoadFilter::public()).await.unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].id.as_deref(), Some("c-row"));
    }

    #[test]
    fn test_normalize_prefers_structured_prompt() {
        let mut image = stored("i1", "u/1.png", "2025-01-02T00:00:00Z");
        image.prompt = Some("plain".into());
        image.ai_json_prompt = Some(json!({"scene": "harbor"}));
        let record = normalize_stored(image, PUBLIC_COLLECTION);
        assert!(matches!(record.prompt, Some(Prompt::Structured(_))));

        let mut image = stored("", "u/2.png", "garbage");
        image.ai_prompt = Some("fallback".into());
        let record = normalize_stored(image, PUBLIC_COLLECTION);
        assert_eq!(record.id, None);
        assert_eq!(record.created_at, DateTime::UNIX_EPOCH);
        assert_eq!(record.prompt, Some(Prompt::Text("fallback".into())));
    }
}
