use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::GalleryConfig;
use crate::engagement::{format_count, HttpMetricsClient};
use crate::gallery::{Gallery, GalleryStatus};
use crate::models::{GalleryItem, SqliteRecordStore};
use crate::source::http::{build_client, HttpProjectClient, HttpUrlSigner};
use crate::source::{FileManifestSource, HttpManifestSource, LoadFilter};

/// Options for one headless gallery run.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub db: Option<PathBuf>,
    pub owner: Option<String>,
    pub query: Option<String>,
    /// Extra load-more steps after the first window.
    pub pages: usize,
    pub with_counts: bool,
}

/// Wires the configured collaborators into a `Gallery` and prints the
/// visible window.
pub struct GalleryApp {
    config: GalleryConfig,
    options: RunOptions,
}

impl GalleryApp {
    pub fn new(config: GalleryConfig, options: RunOptions) -> Self {
        Self { config, options }
    }

    pub async fn run(self) -> Result<()> {
        let mut gallery = self.build()?;

        if let Err(e) = gallery.refresh().await {
            warn!("{}", e);
        }
        if let Some(stats) = gallery.last_stats() {
            info!(
                remote = stats.remote,
                manifest = stats.manifest,
                curated = stats.curated,
                projects = stats.projects,
                "Sources loaded"
            );
        }

        if let Some(query) = &self.options.query {
            gallery.set_query(query);
        }
        for _ in 0..self.options.pages {
            gallery.on_sentinel_visible();
        }
        if self.options.with_counts {
            let report = gallery.refresh_engagement().await;
            if report.failed > 0 {
                warn!("{} count requests failed", report.failed);
            }
        }

        let view = gallery.view();
        match view.status {
            GalleryStatus::Empty => println!("No items."),
            _ => {
                for (pos, item) in view.visible_items.iter().enumerate() {
                    let counts = gallery.engagement_for(item);
                    println!(
                        "{:>4}  {:<8} {:<40} {:>6} likes {:>6} views",
                        pos + 1,
                        kind_label(item),
                        item.key(),
                        format_count(counts.likes),
                        format_count(counts.views),
                    );
                }
                println!(
                    "{} of {} shown{}",
                    view.visible_items.len(),
                    view.total,
                    if view.has_more { ", more available" } else { "" }
                );
            }
        }
        Ok(())
    }

    fn build(&self) -> Result<Gallery> {
        let store = match &self.options.db {
            Some(path) => SqliteRecordStore::open(path)?,
            None => SqliteRecordStore::open_default()?,
        };
        let store = Arc::new(store);
        let sources = &self.config.sources;

        let filter = match &self.options.owner {
            Some(owner) => LoadFilter::owner(owner.clone()),
            None => LoadFilter::public(),
        };
        let mut builder = Gallery::builder(store.clone())
            .config(self.config.clone())
            .filter(filter)
            .project_client(store);

        let needs_http = sources.manifest_url.is_some()
            || sources.signer_url.is_some()
            || self.config.metrics.base_url.is_some()
            || self.config.viewer.project_api_url.is_some();
        let client = if needs_http {
            Some(build_client()?)
        } else {
            None
        };

        if let Some(path) = &sources.manifest_path {
            let mut manifest = FileManifestSource::new(path);
            if let Some(curated) = &sources.curated_manifest_path {
                manifest = manifest.with_curated(curated);
            }
            builder = builder.manifest(Arc::new(manifest));
        } else if let (Some(url), Some(client)) = (&sources.manifest_url, &client) {
            let mut manifest = HttpManifestSource::new(client.clone(), url);
            if let Some(curated) = &sources.curated_manifest_url {
                manifest = manifest.with_curated(curated);
            }
            builder = builder.manifest(Arc::new(manifest));
        }

        if let Some(client) = &client {
            if let Some(url) = &sources.signer_url {
                builder = builder.signer(Arc::new(HttpUrlSigner::new(client.clone(), url)));
            }
            if let Some(url) = &self.config.metrics.base_url {
                builder = builder.metrics(Arc::new(HttpMetricsClient::new(client.clone(), url)));
            }
            if let Some(url) = &self.config.viewer.project_api_url {
                builder = builder.project_client(Arc::new(HttpProjectClient::new(client.clone(), url)));
            }
        }

        Ok(builder.build())
    }
}

fn kind_label(item: &GalleryItem) -> String {
    match item {
        GalleryItem::Single { .. } => "image".to_string(),
        GalleryItem::Group { images, .. } => format!("group:{}", images.len()),
        GalleryItem::Project { .. } => "project".to_string(),
    }
}
