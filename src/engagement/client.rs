//! Batch count endpoints.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::trace;

use super::Metric;
use crate::models::TargetKind;

/// One batch count endpoint per metric.
#[async_trait]
pub trait MetricsClient: Send + Sync {
    /// Counts for `ids`. Ids the service does not know may be absent from
    /// the returned map.
    async fn fetch_batch(
        &self,
        metric: Metric,
        kind: TargetKind,
        ids: &[String],
    ) -> Result<HashMap<String, u64>>;
}

/// Metrics client used when no endpoint is configured. Every id reads as 0.
pub struct OfflineMetrics;

#[async_trait]
impl MetricsClient for OfflineMetrics {
    async fn fetch_batch(
        &self,
        _metric: Metric,
        _kind: TargetKind,
        _ids: &[String],
    ) -> Result<HashMap<String, u64>> {
        Ok(HashMap::new())
    }
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    counts: HashMap<String, u64>,
}

/// `POST {base}/{metric}/batch` with `{targetType, targetIds}`, answered with
/// `{counts: {id: n}}`.
pub struct HttpMetricsClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetricsClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, metric: Metric) -> String {
        format!("{}/{}/batch", self.base_url, metric.as_wire())
    }
}

#[async_trait]
impl MetricsClient for HttpMetricsClient {
    async fn fetch_batch(
        &self,
        metric: Metric,
        kind: TargetKind,
        ids: &[String],
    ) -> Result<HashMap<String, u64>> {
        let url = self.endpoint(metric);
        trace!("POST {} ({} ids)", url, ids.len());

        let response: BatchResponse = self
            .client
            .post(&url)
            .json(&json!({ "targetType": kind.as_wire(), "targetIds": ids }))
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("Malformed counts from {url}"))?;
        Ok(response.counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_per_metric() {
        let client = HttpMetricsClient::new(reqwest::Client::new(), "https://api.example/v1/");
        assert_eq!(client.endpoint(Metric::Likes), "https://api.example/v1/likes/batch");
        assert_eq!(client.endpoint(Metric::Views), "https://api.example/v1/views/batch");
        assert_eq!(
            client.endpoint(Metric::Comments),
            "https://api.example/v1/comments/batch"
        );
    }

    #[test]
    fn test_missing_counts_field() {
        let parsed: BatchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.counts.is_empty());
    }

    #[tokio::test]
    async fn test_offline_metrics_empty() {
        let counts = OfflineMetrics
            .fetch_batch(Metric::Views, TargetKind::Image, &["a".to_string()])
            .await
            .unwrap();
        assert!(counts.is_empty());
    }
}
