//! Modal viewer: navigation state, history sync and project detail.

pub mod navigator;
pub mod project_detail;
pub mod slug;
pub mod url_sync;

pub use navigator::{Step, Transition, ViewerNavigator, ViewerState};
pub use project_detail::{ProjectDetail, ProjectDetailCache};
pub use slug::{image_slug, project_slug};
pub use url_sync::{History, HistoryEntry, MemoryHistory, UrlSync};
