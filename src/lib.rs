//! Gallery aggregation and ranking engine.
//!
//! Merges image records from a record store, a static manifest and a curated
//! collection into grouped, ranked, searchable and paginated gallery items,
//! with batched engagement counts and a history-synced modal viewer.

pub mod app;
pub mod config;
pub mod engagement;
pub mod error;
pub mod gallery;
pub mod models;
pub mod ranking;
pub mod source;
pub mod viewer;

#[cfg(test)]
pub(crate) mod testing;

pub use config::GalleryConfig;
pub use error::{GalleryError, Result};
pub use gallery::{Gallery, GalleryBuilder, GalleryStatus, GalleryView, LoadOutcome, PendingLoad};
pub use models::{GalleryItem, ProjectRecord, RawRecord, TargetKind};
