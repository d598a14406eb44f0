//! Engine-level error taxonomy.
//!
//! Collaborator implementations (SQLite store, HTTP clients, manifest parsing)
//! work with `anyhow::Result` and are converted here at the engine boundary.
//! Only `SourceUnavailable` ever reaches a caller of `Gallery::refresh`; the
//! per-record and per-batch variants are logged and contained by the module
//! that produced them.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GalleryError {
    /// The primary listing query failed; the caller renders an empty state.
    #[error("gallery source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    /// Signed-URL regeneration failed for a single record.
    #[error("failed to refresh asset url for {path}: {reason}")]
    AssetRefreshFailed { path: String, reason: String },

    /// A metrics batch request failed; the affected ids stay at zero.
    #[error("failed to fetch {metric} counts: {reason}")]
    MetricsFetchFailed { metric: &'static str, reason: String },

    /// Project detail or slides could not be loaded for the viewer.
    #[error("project {id} unavailable: {reason}")]
    ProjectUnavailable { id: String, reason: String },

    #[error("failed to read config {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl GalleryError {
    pub(crate) fn source_unavailable(err: &anyhow::Error) -> Self {
        Self::SourceUnavailable {
            reason: format!("{err:#}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, GalleryError>;
