//! Memoized engagement counts for one target kind.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::{Metric, MetricsClient};
use crate::error::GalleryError;
use crate::models::TargetKind;
use crate::ranking::{EngagementCounts, RankingSession};

/// Outcome of one fetch round across all metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Ids sent to the service, summed over metrics.
    pub requested: usize,
    /// Ids whose batch failed, summed over metrics. They stay at 0 and are
    /// retried by the next fetch.
    pub failed: usize,
}

impl FetchReport {
    fn merge(self, other: FetchReport) -> FetchReport {
        FetchReport {
            requested: self.requested + other.requested,
            failed: self.failed + other.failed,
        }
    }
}

/// Per-kind cache of view, like and comment counts.
///
/// Which ids were already requested is tracked in the shared
/// `RankingSession`, so an id is requested at most once per metric until
/// `refetch` clears it.
pub struct EngagementCache {
    kind: TargetKind,
    client: Arc<dyn MetricsClient>,
    session: Arc<RankingSession>,
    batch_limit: usize,
    counts: RwLock<HashMap<Metric, HashMap<String, u64>>>,
    last_requested: Mutex<Vec<String>>,
}

impl EngagementCache {
    pub fn new(
        kind: TargetKind,
        client: Arc<dyn MetricsClient>,
        session: Arc<RankingSession>,
        batch_limit: usize,
    ) -> Self {
        Self {
            kind,
            client,
            session,
            batch_limit: batch_limit.max(1),
            counts: RwLock::new(HashMap::new()),
            last_requested: Mutex::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Requests every metric for the ids not fetched yet. Empty ids and
    /// repeats are ignored.
    pub async fn fetch_counts(&self, ids: &[String]) -> FetchReport {
        let mut seen = HashSet::new();
        let ids: Vec<String> = ids
            .iter()
            .filter(|id| !id.is_empty() && seen.insert(id.as_str()))
            .cloned()
            .collect();
        if ids.is_empty() {
            return FetchReport::default();
        }
        *self.last_requested.lock() = ids.clone();

        let (views, likes, comments) = tokio::join!(
            self.fetch_metric(Metric::Views, &ids),
            self.fetch_metric(Metric::Likes, &ids),
            self.fetch_metric(Metric::Comments, &ids),
        );
        views.merge(likes).merge(comments)
    }

    /// Forgets which ids were fetched and requests the last batch again.
    pub async fn refetch(&self) -> FetchReport {
        for metric in Metric::ALL {
            self.session.forget(self.kind, metric);
        }
        let ids = self.last_requested.lock().clone();
        debug!("Refetching {:?} counts for {} ids", self.kind, ids.len());
        self.fetch_counts(&ids).await
    }

    async fn fetch_metric(&self, metric: Metric, ids: &[String]) -> FetchReport {
        let new_ids = self.session.claim(self.kind, metric, ids);
        if new_ids.is_empty() {
            return FetchReport::default();
        }

        let chunks: Vec<&[String]> = new_ids.chunks(self.batch_limit).collect();
        let results = join_all(
            chunks
                .iter()
                .map(|chunk| self.client.fetch_batch(metric, self.kind, chunk)),
        )
        .await;

        let mut report = FetchReport {
            requested: new_ids.len(),
            failed: 0,
        };
        for (chunk, result) in chunks.into_iter().zip(results) {
            match result {
                Ok(found) => {
                    let mut counts = self.counts.write();
                    let table = counts.entry(metric).or_default();
                    for id in chunk {
                        table.insert(id.clone(), found.get(id).copied().unwrap_or(0));
                    }
                }
                Err(e) => {
                    let err = GalleryError::MetricsFetchFailed {
                        metric: metric.as_wire(),
                        reason: format!("{e:#}"),
                    };
                    warn!("{}", err);
                    self.session.release(self.kind, metric, chunk);
                    report.failed += chunk.len();
                }
            }
        }
        report
    }

    /// Cached count; unknown ids read as 0.
    pub fn count(&self, metric: Metric, id: &str) -> u64 {
        self.counts
            .read()
            .get(&metric)
            .and_then(|table| table.get(id))
            .copied()
            .unwrap_or(0)
    }

    pub fn counts(&self, id: &str) -> EngagementCounts {
        EngagementCounts {
            views: self.count(Metric::Views, id),
            likes: self.count(Metric::Likes, id),
            comments: self.count(Metric::Comments, id),
        }
    }

    /// Optimistic local adjustment, floored at 0. Returns the new value.
    pub fn update_count(&self, metric: Metric, id: &str, delta: i64) -> u64 {
        let mut counts = self.counts.write();
        let value = counts
            .entry(metric)
            .or_default()
            .entry(id.to_string())
            .or_insert(0);
        *value = value.saturating_add_signed(delta);
        *value
    }

    /// Applies a server-confirmed like count as a delta against the cached
    /// value.
    pub fn set_confirmed_likes(&self, id: &str, absolute: u64) -> u64 {
        let current = self.count(Metric::Likes, id);
        let delta = absolute as i64 - current as i64;
        self.update_count(Metric::Likes, id, delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingMetrics;
    use std::sync::atomic::Ordering;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn cache(metrics: Arc<CountingMetrics>, limit: usize) -> EngagementCache {
        EngagementCache::new(
            TargetKind::Image,
            metrics,
            Arc::new(RankingSession::with_seed(0.5)),
            limit,
        )
    }

    #[tokio::test]
    async fn test_fetch_is_idempotent() {
        let metrics = Arc::new(CountingMetrics::default().with_count(Metric::Likes, "a", 4));
        let cache = cache(metrics.clone(), 100);

        let report = cache.fetch_counts(&ids(&["a", "b"])).await;
        assert_eq!(report.requested, 6);
        assert_eq!(metrics.request_count(), 3);
        assert_eq!(cache.count(Metric::Likes, "a"), 4);
        assert_eq!(cache.count(Metric::Likes, "b"), 0);

        let report = cache.fetch_counts(&ids(&["a", "b"])).await;
        assert_eq!(report, FetchReport::default());
        assert_eq!(metrics.request_count(), 3);
    }

    #[tokio::test]
    async fn test_only_new_ids_requested() {
        let metrics = Arc::new(CountingMetrics::default());
        let cache = cache(metrics.clone(), 100);

        cache.fetch_counts(&ids(&["a"])).await;
        cache.fetch_counts(&ids(&["a", "b", "", "b"])).await;
        assert_eq!(metrics.requested_ids(Metric::Views), ids(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_refetch_requests_last_batch() {
        let metrics = Arc::new(CountingMetrics::default());
        let cache = cache(metrics.clone(), 100);

        cache.fetch_counts(&ids(&["a", "b"])).await;
        let report = cache.refetch().await;
        assert_eq!(report.requested, 6);
        assert_eq!(metrics.requested_ids(Metric::Likes), ids(&["a", "b", "a", "b"]));
    }

    #[tokio::test]
    async fn test_chunks_at_batch_limit() {
        let metrics = Arc::new(CountingMetrics::default());
        let cache = cache(metrics.clone(), 100);
        let many: Vec<String> = (0..250).map(|i| format!("id-{i}")).collect();

        cache.fetch_counts(&many).await;
        let sizes: Vec<usize> = metrics
            .requests
            .lock()
            .iter()
            .filter(|(m, _, _)| *m == Metric::Views)
            .map(|(_, _, ids)| ids.len())
            .collect();
        assert_eq!(sizes.len(), 3);
        assert!(sizes.iter().all(|n| *n <= 100));
        assert_eq!(sizes.iter().sum::<usize>(), 250);
    }

    #[tokio::test]
    async fn test_failed_batch_is_retried() {
        let metrics = Arc::new(CountingMetrics::default().with_count(Metric::Views, "a", 9));
        metrics.fail.store(true, Ordering::SeqCst);
        let cache = cache(metrics.clone(), 100);

        let report = cache.fetch_counts(&ids(&["a"])).await;
        assert_eq!(report.failed, 3);
        assert_eq!(cache.count(Metric::Views, "a"), 0);

        metrics.fail.store(false, Ordering::SeqCst);
        let report = cache.fetch_counts(&ids(&["a"])).await;
        assert_eq!(report.failed, 0);
        assert_eq!(cache.count(Metric::Views, "a"), 9);
    }

    #[test]
    fn test_update_count_floors_at_zero() {
        let cache = cache(Arc::new(CountingMetrics::default()), 100);
        assert_eq!(cache.update_count(Metric::Likes, "a", 1), 1);
        assert_eq!(cache.update_count(Metric::Likes, "a", -5), 0);
        assert_eq!(cache.count(Metric::Likes, "unknown"), 0);
    }

    #[test]
    fn test_set_confirmed_likes() {
        let cache = cache(Arc::new(CountingMetrics::default()), 100);
        cache.update_count(Metric::Likes, "a", 3);
        assert_eq!(cache.set_confirmed_likes("a", 10), 10);
        assert_eq!(cache.set_confirmed_likes("a", 2), 2);
        assert_eq!(cache.counts("a").likes, 2);
    }
}
