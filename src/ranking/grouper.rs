//! Deduplication and grouping of raw records into display units.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::models::{GalleryItem, ProjectRecord, RawRecord};

/// Turns one load's records and projects into gallery items.
///
/// Records are stable-sorted newest first, then the first record seen for each
/// path wins. Records sharing a `group_id` become one `Group` (ordered by
/// `group_index`, missing index as 0) unless only one survives, in which case
/// it degrades to a `Single`. Groups are emitted first in first-seen order,
/// then singles, then projects. Projects are never deduplicated against
/// images.
pub fn group(mut records: Vec<RawRecord>, projects: Vec<ProjectRecord>) -> Vec<GalleryItem> {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = records.len();
    let mut seen_paths = HashSet::with_capacity(total);
    let mut group_slots: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<RawRecord>)> = Vec::new();
    let mut singles = Vec::new();

    for record in records {
        if !seen_paths.insert(record.path.clone()) {
            continue;
        }
        match record.group_id.clone() {
            Some(group_id) => {
                let slot = *group_slots.entry(group_id.clone()).or_insert_with(|| {
                    groups.push((group_id, Vec::new()));
                    groups.len() - 1
                });
                groups[slot].1.push(record);
            }
            None => singles.push(record),
        }
    }

    let duplicates = total - seen_paths.len();
    if duplicates > 0 {
        debug!("Dropped {} duplicate paths", duplicates);
    }

    let mut items = Vec::with_capacity(groups.len() + singles.len() + projects.len());
    for (group_id, mut members) in groups {
        if members.len() == 1 {
            if let Some(image) = members.pop() {
                items.push(single(image));
            }
            continue;
        }
        members.sort_by_key(|m| m.group_index.unwrap_or(0));
        let collection = members
            .first()
            .map(|m| m.collection.clone())
            .unwrap_or_default();
        items.push(GalleryItem::Group {
            images: members,
            collection,
            group_id,
        });
    }
    items.extend(singles.into_iter().map(single));
    items.extend(
        projects
            .into_iter()
            .map(|project| GalleryItem::Project { project }),
    );
    items
}

fn single(image: RawRecord) -> GalleryItem {
    let collection = image.collection.clone();
    GalleryItem::Single { image, collection }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{days_ago, project, record};

    fn keys(items: &[GalleryItem]) -> Vec<String> {
        items.iter().map(|i| i.key().to_string()).collect()
    }

    #[test]
    fn test_groups_then_singles() {
        let now = days_ago(0);
        let records = vec![
            record("a", "p/a.png", now).with_group("g1", None),
            record("b", "p/b.png", now).with_group("g1", None),
            record("c", "p/c.png", now),
        ];
        let items = group(records, Vec::new());

        assert_eq!(items.len(), 2);
        match &items[0] {
            GalleryItem::Group { images, group_id, .. } => {
                assert_eq!(group_id, "g1");
                let ids: Vec<_> = images.iter().map(|i| i.key()).collect();
                assert_eq!(ids, vec!["a", "b"]);
            }
            other => panic!("expected group, got {other:?}"),
        }
        assert!(matches!(&items[1], GalleryItem::Single { image, .. } if image.key() == "c"));
    }

    #[test]
    fn test_dedup_keeps_newest_by_path() {
        let records = vec![
            record("old", "same.png", days_ago(5)),
            record("new", "same.png", days_ago(1)),
            record("other", "other.png", days_ago(3)),
        ];
        let items = group(records, Vec::new());
        assert_eq!(keys(&items), vec!["new", "other"]);
    }

    #[test]
    fn test_dedup_stable_on_equal_dates() {
        let when = days_ago(2);
        let records = vec![record("first", "dup.png", when), record("second", "dup.png", when)];
        let items = group(records, Vec::new());
        assert_eq!(keys(&items), vec!["first"]);
    }

    #[test]
    fn test_single_member_group_degrades() {
        let records = vec![
            record("a", "a.png", days_ago(1)).with_group("lonely", Some(3)),
            record("b", "b.png", days_ago(2)),
        ];
        let items = group(records, Vec::new());
        assert!(items
            .iter()
            .all(|i| matches!(i, GalleryItem::Single { .. })));
        assert_eq!(keys(&items), vec!["a", "b"]);
    }

    #[test]
    fn test_members_ordered_by_index() {
        let when = days_ago(1);
        let records = vec![
            record("x2", "x2.png", when).with_group("g", Some(2)),
            record("x0", "x0.png", when).with_group("g", None),
            record("x1", "x1.png", when).with_group("g", Some(1)),
        ];
        let items = group(records, Vec::new());
        let ids: Vec<_> = items[0].images().iter().map(|i| i.key()).collect();
        assert_eq!(ids, vec!["x0", "x1", "x2"]);
    }

    #[test]
    fn test_projects_appended_verbatim() {
        let records = vec![record("a", "a.png", days_ago(1))];
        let items = group(records, vec![project("p1", 1), project("p2", 9)]);
        assert_eq!(keys(&items), vec!["a", "p1", "p2"]);
        assert!(matches!(items[1], GalleryItem::Project { .. }));
    }

    #[test]
    fn test_empty_input() {
        assert!(group(Vec::new(), Vec::new()).is_empty());
    }
}
