//! Runtime configuration.
//!
//! Read from `XDG_CONFIG_HOME/gallery-engine/config.toml` when present. Every
//! section is optional and falls back to the defaults below, so an empty or
//! missing file yields a working configuration.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{GalleryError, Result};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    pub pagination: PaginationConfig,
    pub ranking: RankingConfig,
    pub search: SearchConfig,
    pub sources: SourceConfig,
    pub metrics: MetricsConfig,
    pub viewer: ViewerConfig,
}

/// Incremental reveal of the ranked list.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Number of items visible after a reset.
    pub initial: usize,
    /// Number of items revealed per load-more signal.
    pub step: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            initial: 36,
            step: 36,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub weights: ScoreWeights,
    pub engagement: EngagementWeights,
    pub freshness: FreshnessTiers,
}

/// Blend of the three score components.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub engagement: f64,
    pub freshness: f64,
    pub random: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            engagement: 0.2,
            freshness: 0.5,
            random: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngagementWeights {
    pub likes: f64,
    pub views: f64,
    pub comments: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            likes: 3.0,
            views: 0.5,
            comments: 2.0,
        }
    }
}

/// Tiered bonus for recently created items.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FreshnessTiers {
    pub fresh_days: f64,
    pub fresh_bonus: f64,
    pub recent_days: f64,
    pub recent_bonus: f64,
}

impl Default for FreshnessTiers {
    fn default() -> Self {
        Self {
            fresh_days: 7.0,
            fresh_bonus: 10.0,
            recent_days: 30.0,
            recent_bonus: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Trailing debounce window applied to typed queries.
    pub debounce_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Bucket used when a stored row does not name one.
    pub default_bucket: String,
    /// Lifetime of freshly issued signed URLs.
    pub url_ttl_secs: u64,
    /// Curated group ids that are never shown.
    pub excluded_group_ids: Vec<String>,
    pub manifest_path: Option<PathBuf>,
    pub manifest_url: Option<String>,
    pub curated_manifest_path: Option<PathBuf>,
    pub curated_manifest_url: Option<String>,
    /// Endpoint of the signed-URL service; refresh is skipped when unset.
    pub signer_url: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            default_bucket: "saved-gallery".to_string(),
            url_ttl_secs: 24 * 60 * 60,
            excluded_group_ids: Vec::new(),
            manifest_path: None,
            manifest_url: None,
            curated_manifest_path: None,
            curated_manifest_url: None,
            signer_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Base URL of the batch count endpoints; counts stay at zero when unset.
    pub base_url: Option<String>,
    /// Maximum ids per batch request.
    pub batch_limit: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            batch_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Path prefix of history entries pushed by the viewer.
    pub base_path: String,
    pub project_cache_capacity: usize,
    pub project_api_url: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            base_path: "/gallery".to_string(),
            project_cache_capacity: 32,
            project_api_url: None,
        }
    }
}

impl GalleryConfig {
    /// Loads the config from `path`, or from the default XDG location when
    /// `path` is `None`. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(&path).map_err(|source| {
                    GalleryError::ConfigRead {
                        path: path.clone(),
                        source,
                    }
                })?;
                info!("Loaded config from {:?}", path);
                Self::from_toml(&text)?
            }
            Some(path) => {
                debug!("No config at {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "gallery-engine").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(size) = env_usize("GALLERY_PAGE_SIZE") {
            self.pagination.initial = size;
            self.pagination.step = size;
        }
        if let Some(ms) = env_usize("GALLERY_DEBOUNCE_MS") {
            self.search.debounce_ms = ms as u64;
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
}
