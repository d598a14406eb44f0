//! History identifiers for viewer entries.

use xxhash_rust::xxh3::xxh3_64;

use crate::models::{ProjectRecord, RawRecord};

/// Identifier of an image entry: its id, or for id-less manifest images a
/// slug of the file stem suffixed with a short hash of the full path.
pub fn image_slug(record: &RawRecord) -> String {
    if let Some(id) = record.id.as_deref().filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    let stem = record
        .filename
        .rsplit_once('.')
        .map_or(record.filename.as_str(), |(stem, _)| stem);
    let hash = xxh3_64(record.path.as_bytes()) as u32;
    match slugify(stem) {
        s if s.is_empty() => format!("image-{hash:08x}"),
        s => format!("{s}-{hash:08x}"),
    }
}

pub fn project_slug(project: &ProjectRecord) -> String {
    format!("projects/{}", project.id)
}

/// Lowercase ASCII alphanumerics joined by single dashes.
fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
