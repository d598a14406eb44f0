//! Engagement counts (views, likes, comments) for images and projects.
//!
//! - `EngagementCache` - Batched, memoized counts for one target kind
//! - `MetricsClient` - The batch count endpoints
//! - `Engagement` - Image and project caches behind one `EngagementSource`

pub mod cache;
pub mod client;

use std::sync::Arc;

use crate::models::{GalleryItem, TargetKind};
use crate::ranking::{EngagementCounts, EngagementSource, RankingSession};

pub use cache::{EngagementCache, FetchReport};
pub use client::{HttpMetricsClient, MetricsClient, OfflineMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Views,
    Likes,
    Comments,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Views, Metric::Likes, Metric::Comments];

    /// Path segment of the batch endpoint.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Views => "views",
            Self::Likes => "likes",
            Self::Comments => "comments",
        }
    }
}

/// Both per-kind caches.
pub struct Engagement {
    pub images: EngagementCache,
    pub projects: EngagementCache,
}

impl Engagement {
    pub fn new(client: Arc<dyn MetricsClient>, session: Arc<RankingSession>, batch_limit: usize) -> Self {
        Self {
            images: EngagementCache::new(
                TargetKind::Image,
                client.clone(),
                session.clone(),
                batch_limit,
            ),
            projects: EngagementCache::new(TargetKind::Project, client, session, batch_limit),
        }
    }

    pub fn cache(&self, kind: TargetKind) -> &EngagementCache {
        match kind {
            TargetKind::Image => &self.images,
            TargetKind::Project => &self.projects,
        }
    }

    /// Fetches counts for every id displayed by `items`, split by kind.
    pub async fn fetch_for(&self, items: &[GalleryItem]) -> FetchReport {
        let mut image_ids = Vec::new();
        let mut project_ids = Vec::new();
        for item in items {
            match item.kind() {
                TargetKind::Image => image_ids.extend(item.target_ids()),
                TargetKind::Project => project_ids.extend(item.target_ids()),
            }
        }

        let (images, projects) = tokio::join!(
            self.images.fetch_counts(&image_ids),
            self.projects.fetch_counts(&project_ids),
        );
        FetchReport {
            requested: images.requested + projects.requested,
            failed: images.failed + projects.failed,
        }
    }

    pub async fn refetch(&self) -> FetchReport {
        let (images, projects) = tokio::join!(self.images.refetch(), self.projects.refetch());
        FetchReport {
            requested: images.requested + projects.requested,
            failed: images.failed + projects.failed,
        }
    }
}

impl EngagementSource for Engagement {
    fn counts(&self, kind: TargetKind, id: &str) -> EngagementCounts {
        self.cache(kind).counts(id)
    }
}

/// Compact display value: `999`, `1.2K`, `3.4M`.
pub fn format_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{days_ago, project, record, CountingMetrics};

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1.0K");
        assert_eq!(format_count(1_240), "1.2K");
        assert_eq!(format_count(3_400_000), "3.4M");
    }

    #[tokio::test]
    async fn test_fetch_for_splits_kinds() {
        let metrics = Arc::new(
            CountingMetrics::default()
                .with_count(Metric::Likes, "img", 2)
                .with_count(Metric::Likes, "p1", 7),
        );
        let engagement = Engagement::new(metrics.clone(), Arc::new(RankingSession::new()), 100);
        let items = vec![
            GalleryItem::Single {
                image: record("img", "p/img.png", days_ago(1)),
                collection: "public".into(),
            },
            GalleryItem::Project {
                project: project("p1", 1),
            },
        ];

        engagement.fetch_for(&items).await;
        assert_eq!(engagement.counts(TargetKind::Image, "img").likes, 2);
        assert_eq!(engagement.counts(TargetKind::Project, "p1").likes, 7);

        let kinds: Vec<_> = metrics
            .requests
            .lock()
            .iter()
            .map(|(_, kind, _)| *kind)
            .collect();
        assert!(kinds.contains(&TargetKind::Image) && kinds.contains(&TargetKind::Project));
    }
}
