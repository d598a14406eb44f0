use std::slice;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::raw_record::{RawRecord, Visibility};

/// Engagement target type, also the viewer kind an item opens in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Image,
    Project,
}

impl TargetKind {
    /// Name used by the batch metrics endpoints.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Image => "saved_image",
            Self::Project => "project",
        }
    }
}

/// An independently sourced multi-slide project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub slide_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub visibility: Visibility,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// One slide of a project, fetched when the project is opened in the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub id: String,
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// One ranked, rendered unit.
#[derive(Debug, Clone, PartialEq)]
pub enum GalleryItem {
    Single {
        image: RawRecord,
        collection: String,
    },
    Group {
        /// Ordered by explicit sub-index.
        images: Vec<RawRecord>,
        collection: String,
        group_id: String,
    },
    Project {
        project: ProjectRecord,
    },
}

impl GalleryItem {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Single { .. } | Self::Group { .. } => TargetKind::Image,
            Self::Project { .. } => TargetKind::Project,
        }
    }

    /// Identifier used for ranking jitter, list identity and viewer re-resolution.
    pub fn key(&self) -> &str {
        match self {
            Self::Single { image, .. } => image.key(),
            Self::Group { group_id, .. } => group_id,
            Self::Project { project } => &project.id,
        }
    }

    /// The date ranking freshness is computed from.
    pub fn representative_date(&self) -> DateTime<Utc> {
        match self {
            Self::Single { image, .. } => image.created_at,
            Self::Group { images, .. } => images
                .first()
                .map(|img| img.created_at)
                .unwrap_or(DateTime::UNIX_EPOCH),
            Self::Project { project } => project.created_at,
        }
    }

    /// The id engagement counts are looked up under. Groups use their first
    /// member; id-less manifest images have none.
    pub fn engagement_id(&self) -> Option<&str> {
        match self {
            Self::Single { image, .. } => image.id.as_deref(),
            Self::Group { images, .. } => images.first().and_then(|img| img.id.as_deref()),
            Self::Project { project } => Some(&project.id),
        }
    }

    /// Images navigable inside this item. Projects have none.
    pub fn images(&self) -> &[RawRecord] {
        match self {
            Self::Single { image, .. } => slice::from_ref(image),
            Self::Group { images, .. } => images,
            Self::Project { .. } => &[],
        }
    }

    pub fn member_count(&self) -> usize {
        self.images().len()
    }

    pub fn collection(&self) -> Option<&str> {
        match self {
            Self::Single { collection, .. } | Self::Group { collection, .. } => Some(collection),
            Self::Project { .. } => None,
        }
    }

    /// Ids whose engagement counts a rendered card displays.
    pub fn target_ids(&self) -> Vec<String> {
        match self {
            Self::Project { project } => vec![project.id.clone()],
            _ => self.images().iter().filter_map(|img| img.id.clone()).collect(),
        }
    }

    /// Replaces a member record with the same id, keeping position.
    /// Returns true if a member was replaced.
    pub fn replace_record(&mut self, record: &RawRecord) -> bool {
        match self {
            Self::Single { image, .. } => {
                if image.same_id(record) {
                    *image = record.clone();
                    return true;
                }
                false
            }
            Self::Group { images, .. } => {
                let mut replaced = false;
                for img in images.iter_mut().filter(|img| img.same_id(record)) {
                    *img = record.clone();
                    replaced = true;
                }
                replaced
            }
            Self::Project { .. } => false,
        }
    }

    /// Replaces the project with the same id. Returns true on a match.
    pub fn replace_project(&mut self, updated: &ProjectRecord) -> bool {
        match self {
            Self::Project { project } if project.id == updated.id => {
                *project = updated.clone();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use chrono::TimeZone;

    fn record(id: &str, path: &str) -> RawRecord {
        RawRecord::new(path, Utc::now(), SourceKind::Remote).with_id(id)
    }

    #[test]
    fn test_group_identity_uses_first_member() {
        let first = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let mut a = record("a", "g/a.png");
        a.created_at = first;
        let item = GalleryItem::Group {
            images: vec![a, record("b", "g/b.png")],
            collection: "public".into(),
            group_id: "g1".into(),
        };

        assert_eq!(item.key(), "g1");
        assert_eq!(item.engagement_id(), Some("a"));
        assert_eq!(item.representative_date(), first);
        assert_eq!(item.member_count(), 2);
        assert_eq!(item.target_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_single_is_one_member() {
        let item = GalleryItem::Single {
            image: RawRecord::new("m/x.jpg", Utc::now(), SourceKind::Manifest),
            collection: "landscapes".into(),
        };
        assert_eq!(item.member_count(), 1);
        assert_eq!(item.key(), "m/x.jpg");
        assert_eq!(item.engagement_id(), None);
        assert_eq!(item.kind(), TargetKind::Image);
    }

    #[test]
    fn test_replace_record_by_id() {
        let mut item = GalleryItem::Group {
            images: vec![record("a", "g/a.png"), record("b", "g/b.png")],
            collection: "public".into(),
            group_id: "g1".into(),
        };
        let updated = record("b", "g/b.png").with_visibility(Visibility::Private);

        assert!(item.replace_record(&updated));
        assert_eq!(item.images()[1].visibility, Visibility::Private);
        assert_eq!(item.images()[0].visibility, Visibility::Public);
        assert!(!item.replace_record(&record("zz", "g/zz.png")));
    }
}
