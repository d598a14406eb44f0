//! Mirrors viewer transitions into navigation history.

use tracing::debug;

use super::navigator::{Transition, ViewerNavigator, ViewerState};
use super::slug::{image_slug, project_slug};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub url: String,
    /// Image id / slug or `projects/{id}`; empty for the gallery itself.
    pub identifier: String,
    /// Set on entries pushed by the viewer.
    pub is_modal: bool,
}

impl HistoryEntry {
    pub fn page(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            identifier: String::new(),
            is_modal: false,
        }
    }
}

/// Navigation history the viewer writes to.
pub trait History {
    fn push(&mut self, entry: HistoryEntry);

    fn replace(&mut self, entry: HistoryEntry);

    /// Moves one entry back and returns the new current entry.
    fn back(&mut self) -> Option<&HistoryEntry>;

    fn current(&self) -> Option<&HistoryEntry>;
}

/// In-process history stack with a cursor, like a browser tab.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    entries: Vec<HistoryEntry>,
    cursor: usize,
}

impl MemoryHistory {
    pub fn new(start: HistoryEntry) -> Self {
        Self {
            entries: vec![start],
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }
}

impl History for MemoryHistory {
    fn push(&mut self, entry: HistoryEntry) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(entry);
        self.cursor = self.entries.len() - 1;
    }

    fn replace(&mut self, entry: HistoryEntry) {
        match self.entries.get_mut(self.cursor) {
            Some(current) => *current = entry,
            None => self.push(entry),
        }
    }

    fn back(&mut self) -> Option<&HistoryEntry> {
        if self.cursor > 0 {
            self.cursor -= 1;
        }
        self.entries.get(self.cursor)
    }

    fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor)
    }
}

pub struct UrlSync<H> {
    history: H,
    base_path: String,
}

impl<H: History> UrlSync<H> {
    pub fn new(history: H, base_path: impl Into<String>) -> Self {
        Self {
            history,
            base_path: base_path.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut H {
        &mut self.history
    }

    /// Writes `transition` to history: push on open, replace on moves, go
    /// back on close when the current entry is the viewer's own.
    pub fn apply(&mut self, transition: &Transition, navigator: &ViewerNavigator) {
        match transition {
            Transition::Opened(_) => {
                if let Some(entry) = self.entry_for(navigator) {
                    debug!("History push {}", entry.url);
                    self.history.push(entry);
                }
            }
            Transition::Moved { .. } => {
                if let Some(entry) = self.entry_for(navigator) {
                    self.history.replace(entry);
                }
            }
            Transition::Closed => {
                let modal = self.history.current().is_some_and(|e| e.is_modal);
                if modal {
                    self.history.back();
                } else if self.history.current().map(|e| e.url.as_str()) != Some(self.base_url()) {
                    // Opened from a deep link: there is nothing to go back to.
                    let base = HistoryEntry::page(self.base_url());
                    self.history.push(base);
                }
            }
            Transition::Unchanged => {}
        }
    }

    /// Handles a back/forward navigation that already moved the history.
    /// Forces the viewer closed when the new entry is not a viewer entry.
    pub fn on_pop(&mut self, navigator: &mut ViewerNavigator) -> Transition {
        let modal = self.history.current().is_some_and(|e| e.is_modal);
        if navigator.state().is_open() && !modal {
            debug!("Back navigation left the viewer, closing");
            return navigator.close();
        }
        Transition::Unchanged
    }

    fn base_url(&self) -> &str {
        if self.base_path.is_empty() {
            "/"
        } else {
            &self.base_path
        }
    }

    fn entry_for(&self, navigator: &ViewerNavigator) -> Option<HistoryEntry> {
        let identifier = match navigator.state() {
            ViewerState::Closed => return None,
            ViewerState::ViewingImage { .. } => image_slug(navigator.current_image()?),
            ViewerState::ViewingProject { .. } => match navigator.current_item()? {
                crate::models::GalleryItem::Project { project } => project_slug(project),
                _ => return None,
            },
        };
        Some(HistoryEntry {
            url: format!("{}/{}", self.base_path, identifier),
            identifier,
            is_modal: true,
        })
    }
}
