//! Composite relevance ranking.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::session::RankingSession;
use crate::config::{EngagementWeights, FreshnessTiers, RankingConfig};
use crate::models::{GalleryItem, TargetKind};

/// Raw counts for one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngagementCounts {
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

impl EngagementCounts {
    pub fn weighted(&self, weights: &EngagementWeights) -> f64 {
        self.likes as f64 * weights.likes
            + self.views as f64 * weights.views
            + self.comments as f64 * weights.comments
    }
}

/// Read-only view of whatever counts are cached right now. Ranking never
/// waits on I/O; unknown targets read as zero.
pub trait EngagementSource {
    fn counts(&self, kind: TargetKind, id: &str) -> EngagementCounts;
}

/// Engagement source for rankings taken before any counts arrive.
pub struct NoEngagement;

impl EngagementSource for NoEngagement {
    fn counts(&self, _kind: TargetKind, _id: &str) -> EngagementCounts {
        EngagementCounts::default()
    }
}

/// Score components of one item, kept separate for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub engagement: f64,
    pub freshness: f64,
    pub random: f64,
    pub total: f64,
}

pub struct RankingScorer {
    session: Arc<RankingSession>,
    config: RankingConfig,
}

impl RankingScorer {
    pub fn new(session: Arc<RankingSession>, config: RankingConfig) -> Self {
        Self { session, config }
    }

    pub fn session(&self) -> &Arc<RankingSession> {
        &self.session
    }

    pub fn score(
        &self,
        item: &GalleryItem,
        engagement: &dyn EngagementSource,
        now: DateTime<Utc>,
    ) -> Score {
        let weights = &self.config.weights;
        let engagement = item
            .engagement_id()
            .map(|id| {
                engagement
                    .counts(item.kind(), id)
                    .weighted(&self.config.engagement)
            })
            .unwrap_or(0.0);
        let freshness = freshness_bonus(&self.config.freshness, item.representative_date(), now);
        let random = self.session.jitter(item.key());

        Score {
            engagement,
            freshness,
            random,
            total: engagement * weights.engagement
                + freshness * weights.freshness
                + random * weights.random,
        }
    }

    /// Returns a new vector sorted by descending score. Equal scores keep
    /// their input order.
    pub fn rank(
        &self,
        items: &[GalleryItem],
        engagement: &dyn EngagementSource,
        now: DateTime<Utc>,
    ) -> Vec<GalleryItem> {
        let mut scored: Vec<(f64, &GalleryItem)> = items
            .iter()
            .map(|item| (self.score(item, engagement, now).total, item))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().map(|(_, item)| item.clone()).collect()
    }
}

/// Tiered recency bonus. Dates in the future count as brand new.
pub fn freshness_bonus(tiers: &FreshnessTiers, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - created_at).num_seconds().max(0) as f64 / 86_400.0;
    if age_days <= tiers.fresh_days {
        tiers.fresh_bonus
    } else if age_days <= tiers.recent_days {
        tiers.recent_bonus
    } else {
        0.0
    }
}
