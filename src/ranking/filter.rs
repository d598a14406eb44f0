//! Free-text filtering and search debounce.

use std::time::Duration;

use tokio::time::Instant;

use crate::models::{GalleryItem, RawRecord};

/// Keeps the items matching `query`. A blank query returns the input
/// unchanged. Matching is a case-insensitive substring test over every
/// searchable field; a group matches when any member does and is kept whole.
pub fn filter_items(items: &[GalleryItem], query: &str) -> Vec<GalleryItem> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return items.to_vec();
    }
    items
        .iter()
        .filter(|item| item_matches(item, &needle))
        .cloned()
        .collect()
}

/// `needle` must already be lowercased.
pub fn item_matches(item: &GalleryItem, needle: &str) -> bool {
    match item {
        GalleryItem::Project { project } => {
            contains(&project.name, needle)
                || project.prompt.as_deref().is_some_and(|p| contains(p, needle))
        }
        _ => item.images().iter().any(|image| record_matches(image, needle)),
    }
}

fn record_matches(record: &RawRecord, needle: &str) -> bool {
    record
        .prompt
        .as_ref()
        .is_some_and(|p| contains(&p.searchable_text(), needle))
        || record.keywords.iter().any(|k| contains(k, needle))
        || record.links.iter().any(|l| contains(l, needle))
        || record
            .curated
            .as_ref()
            .is_some_and(|c| c.iter().any(|field| contains(field, needle)))
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Trailing-edge debounce for typed queries. Every keystroke restarts the
/// window; only the last input is released once the window passes.
#[derive(Debug)]
pub struct SearchDebounce {
    window: Duration,
    pending: Option<(String, Instant)>,
}

impl SearchDebounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn input(&mut self, query: impl Into<String>, now: Instant) {
        self.pending = Some((query.into(), now + self.window));
    }

    /// When the pending query becomes due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, due)| *due)
    }

    /// Releases the pending query once its window has passed.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((_, due)) if *due <= now => self.pending.take().map(|(q, _)| q),
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
