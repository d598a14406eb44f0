//! Ranking pipeline: grouping, scoring, filtering and pagination.
//!
//! - `group` - Deduplicates records and clusters them into gallery items
//! - `RankingScorer` - Engagement + freshness + per-session jitter
//! - `filter_items` / `SearchDebounce` - Free-text search over items
//! - `Pagination` - Monotonic visible window over the ranked list

pub mod filter;
pub mod grouper;
pub mod pagination;
pub mod scorer;
pub mod session;

pub use filter::{filter_items, SearchDebounce};
pub use grouper::group;
pub use pagination::{list_identity, Pagination};
pub use scorer::{EngagementCounts, EngagementSource, NoEngagement, RankingScorer, Score};
pub use session::RankingSession;
