//! On-demand project detail for the project viewer.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{GalleryError, Result};
use crate::models::{ProjectRecord, Slide};
use crate::source::ProjectClient;

/// A project with its slides, ordered by position.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDetail {
    pub project: ProjectRecord,
    pub slides: Vec<Slide>,
}

/// LRU of recently opened projects.
pub struct ProjectDetailCache {
    client: Arc<dyn ProjectClient>,
    cache: Mutex<LruCache<String, Arc<ProjectDetail>>>,
}

impl ProjectDetailCache {
    pub fn new(client: Arc<dyn ProjectClient>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached detail, fetching project and slides concurrently on a miss.
    pub async fn get(&self, id: &str) -> Result<Arc<ProjectDetail>> {
        let cached = self.cache.lock().get(id).cloned();
        if let Some(detail) = cached {
            return Ok(detail);
        }

        let (project, mut slides) =
            tokio::try_join!(self.client.project(id), self.client.slides(id)).map_err(|e| {
                GalleryError::ProjectUnavailable {
                    id: id.to_string(),
                    reason: format!("{e:#}"),
                }
            })?;
        slides.sort_by_key(|slide| slide.position);
        debug!("Fetched project {} with {} slides", id, slides.len());

        let detail = Arc::new(ProjectDetail { project, slides });
        self.cache.lock().put(id.to_string(), detail.clone());
        Ok(detail)
    }

    /// Drops a cached entry so the next open refetches it.
    pub fn invalidate(&self, id: &str) {
        self.cache.lock().pop(id);
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}
