//! Incremental reveal over the ranked, filtered list.

use xxhash_rust::xxh3::xxh3_64;

use crate::config::PaginationConfig;
use crate::models::GalleryItem;

/// Identity of a ranked, filtered list: a hash over the ordered item keys
/// plus the query. Any reorder, insertion, removal or query change yields a
/// new identity.
pub fn list_identity(items: &[GalleryItem], query: &str) -> u64 {
    let mut hasher_input = Vec::with_capacity(items.len() * 40 + query.len() + 1);
    for item in items {
        hasher_input.extend_from_slice(item.key().as_bytes());
        // Separator so adjacent keys cannot run together.
        hasher_input.push(0);
    }
    hasher_input.push(0xff);
    hasher_input.extend_from_slice(query.trim().as_bytes());
    xxh3_64(&hasher_input)
}

/// Visible window state.
#[derive(Debug, Clone)]
pub struct Pagination {
    initial: usize,
    step: usize,
    limit: usize,
    len: usize,
    identity: Option<u64>,
}

impl Pagination {
    pub fn new(config: &PaginationConfig) -> Self {
        Self {
            initial: config.initial.max(1),
            step: config.step.max(1),
            limit: config.initial.max(1),
            len: 0,
            identity: None,
        }
    }

    /// Records the upstream list. The window resets only when `identity`
    /// differs from the last one seen. Returns true on reset.
    pub fn sync(&mut self, identity: u64, len: usize) -> bool {
        self.len = len;
        if self.identity == Some(identity) {
            return false;
        }
        self.identity = Some(identity);
        self.limit = self.initial;
        true
    }

    /// Advances by one step. Returns the new visible count, unchanged once
    /// the list is exhausted.
    pub fn load_more(&mut self) -> usize {
        if self.has_more() {
            self.limit = (self.limit + self.step).min(self.len);
        }
        self.visible_count()
    }

    pub fn visible_count(&self) -> usize {
        self.limit.min(self.len)
    }

    pub fn has_more(&self) -> bool {
        self.limit < self.len
    }

    pub fn window<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[..self.visible_count().min(items.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{days_ago, record};

    fn items(n: usize) -> Vec<GalleryItem> {
        (0..n)
            .map(|i| GalleryItem::Single {
                image: record(&format!("i{i}"), &format!("p/{i}.png"), days_ago(1)),
                collection: "public".into(),
            })
            .collect()
    }

    fn pagination() -> Pagination {
        Pagination::new(&PaginationConfig {
            initial: 36,
            step: 36,
        })
    }

    #[test]
    fn test_monotonic_until_exhausted() {
        let list = items(100);
        let mut page = pagination();
        page.sync(list_identity(&list, ""), list.len());

        assert_eq!(page.visible_count(), 36);
        assert_eq!(page.load_more(), 72);
        assert_eq!(page.load_more(), 100);
        assert!(!page.has_more());
        assert_eq!(page.load_more(), 100);
        assert_eq!(page.window(&list).len(), 100);
    }

    #[test]
    fn test_short_list_never_exceeds_len() {
        let list = items(10);
        let mut page = pagination();
        page.sync(list_identity(&list, ""), list.len());
        assert_eq!(page.visible_count(), 10);
        assert_eq!(page.load_more(), 10);
    }

    #[test]
    fn test_resets_only_on_identity_change() {
        let list = items(80);
        let identity = list_identity(&list, "");
        let mut page = pagination();
        assert!(page.sync(identity, list.len()));
        page.load_more();

        assert!(!page.sync(identity, list.len()));
        assert_eq!(page.visible_count(), 72);

        assert!(page.sync(list_identity(&list, "sea"), list.len()));
        assert_eq!(page.visible_count(), 36);
    }

    #[test]
    fn test_identity_tracks_order_and_query() {
        let list = items(3);
        let mut reversed = list.clone();
        reversed.reverse();

        assert_eq!(list_identity(&list, "a"), list_identity(&list, " a "));
        assert_ne!(list_identity(&list, ""), list_identity(&reversed, ""));
        assert_ne!(list_identity(&list, ""), list_identity(&list[..2], ""));
        assert_ne!(list_identity(&list, ""), list_identity(&list, "a"));
    }
}
