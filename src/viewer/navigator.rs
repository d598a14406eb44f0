//! Modal viewer state machine.
//!
//! The navigator resolves every move against the list snapshot it was opened
//! with. Stepping within a group wraps; stepping across items clamps at both
//! ends and switches viewer kind when the neighbour is of a different kind.

use std::sync::Arc;

use tracing::trace;

use crate::models::{GalleryItem, RawRecord, TargetKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewerState {
    #[default]
    Closed,
    ViewingImage {
        item_index: usize,
        sub_index: usize,
    },
    ViewingProject {
        item_index: usize,
    },
}

impl ViewerState {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    pub fn item_index(&self) -> Option<usize> {
        match *self {
            Self::Closed => None,
            Self::ViewingImage { item_index, .. } | Self::ViewingProject { item_index } => {
                Some(item_index)
            }
        }
    }
}

/// Navigation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Forward,
    Backward,
}

impl Step {
    fn delta(self) -> isize {
        match self {
            Self::Forward => 1,
            Self::Backward => -1,
        }
    }
}

/// What a navigation call did; consumed by `UrlSync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Opened(ViewerState),
    Moved { from: ViewerState, to: ViewerState },
    Closed,
    Unchanged,
}

#[derive(Debug, Default)]
pub struct ViewerNavigator {
    items: Arc<Vec<GalleryItem>>,
    state: ViewerState,
}

impl ViewerNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    /// The snapshot navigation resolves against.
    pub fn items(&self) -> &Arc<Vec<GalleryItem>> {
        &self.items
    }

    /// Opens `index` of `items`, clamping out-of-range indices. The viewer
    /// kind follows the item. Opening on an empty list leaves (or makes) the
    /// viewer closed.
    pub fn open(&mut self, items: Arc<Vec<GalleryItem>>, index: usize, sub_index: usize) -> Transition {
        self.items = items;
        if self.items.is_empty() {
            return self.close();
        }
        let index = index.min(self.items.len() - 1);
        let to = self.state_for(index, sub_index);
        self.move_to(to)
    }

    /// Steps inside the current group, wrapping at both ends. Only valid while
    /// viewing an image; a single is a one-member group.
    pub fn step_within_group(&mut self, step: Step) -> Transition {
        let ViewerState::ViewingImage {
            item_index,
            sub_index,
        } = self.state
        else {
            return Transition::Unchanged;
        };
        let members = self
            .items
            .get(item_index)
            .map(GalleryItem::member_count)
            .unwrap_or(0);
        if members <= 1 {
            return Transition::Unchanged;
        }
        let next = (sub_index as isize + step.delta()).rem_euclid(members as isize) as usize;
        self.move_to(ViewerState::ViewingImage {
            item_index,
            sub_index: next,
        })
    }

    /// Steps to the neighbouring top-level item, clamped at the ends. The
    /// sub-index resets to 0.
    pub fn step_across_items(&mut self, step: Step) -> Transition {
        let Some(item_index) = self.state.item_index() else {
            return Transition::Unchanged;
        };
        let target = item_index as isize + step.delta();
        if target < 0 || target as usize >= self.items.len() {
            return Transition::Unchanged;
        }
        let to = self.state_for(target as usize, 0);
        self.move_to(to)
    }

    pub fn close(&mut self) -> Transition {
        if !self.state.is_open() {
            return Transition::Unchanged;
        }
        self.state = ViewerState::Closed;
        Transition::Closed
    }

    /// Re-resolves the current item by key against a new list. Closes the
    /// viewer when the item is gone.
    pub fn rebase(&mut self, items: Arc<Vec<GalleryItem>>) -> Transition {
        let current = self.current_item().map(|item| item.key().to_string());
        let sub_index = match self.state {
            ViewerState::ViewingImage { sub_index, .. } => sub_index,
            _ => 0,
        };
        self.items = items;

        let Some(key) = current else {
            return Transition::Unchanged;
        };
        match self.items.iter().position(|item| item.key() == key) {
            Some(index) => {
                let to = self.state_for(index, sub_index);
                self.move_to(to)
            }
            None => {
                trace!("Viewer item {} left the list, closing", key);
                self.close()
            }
        }
    }

    pub fn current_item(&self) -> Option<&GalleryItem> {
        self.state.item_index().and_then(|index| self.items.get(index))
    }

    /// The image on screen, if viewing an image.
    pub fn current_image(&self) -> Option<&RawRecord> {
        match self.state {
            ViewerState::ViewingImage {
                item_index,
                sub_index,
            } => self
                .items
                .get(item_index)
                .and_then(|item| item.images().get(sub_index)),
            _ => None,
        }
    }

    /// `index` must be in range.
    fn state_for(&self, index: usize, sub_index: usize) -> ViewerState {
        let item = &self.items[index];
        match item.kind() {
            TargetKind::Image => ViewerState::ViewingImage {
                item_index: index,
                sub_index: sub_index.min(item.member_count().saturating_sub(1)),
            },
            TargetKind::Project => ViewerState::ViewingProject { item_index: index },
        }
    }

    fn move_to(&mut self, to: ViewerState) -> Transition {
        let from = self.state;
        self.state = to;
        if !from.is_open() {
            Transition::Opened(to)
        } else if from == to {
            Transition::Unchanged
        } else {
            Transition::Moved { from, to }
        }
    }
}
