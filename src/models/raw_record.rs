use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn from_flag(is_public: bool) -> Self {
        if is_public {
            Self::Public
        } else {
            Self::Private
        }
    }

    pub fn is_public(self) -> bool {
        self == Self::Public
    }
}

/// Where a record came from. Downstream stages never branch on this; it is
/// kept for diagnostics and for deciding which records may be refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Remote,
    Manifest,
}

/// A generation prompt: either free text or a structured JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    Structured(Value),
}

impl Prompt {
    /// Normalizes an arbitrary JSON value. Null and empty strings carry no
    /// prompt; a string that itself holds a JSON object stays text.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(Self::Text(s)),
            other => Some(Self::Structured(other)),
        }
    }

    pub fn from_text(text: Option<String>) -> Option<Self> {
        text.filter(|t| !t.trim().is_empty()).map(Self::Text)
    }

    /// Text used for search matching; structured prompts are serialized.
    pub fn searchable_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

/// Extra searchable fields carried by curated records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CuratedFields {
    pub authors: Vec<String>,
    pub search_queries: Vec<String>,
    pub search_strategies: Vec<String>,
    pub external_ids: Vec<String>,
}

impl CuratedFields {
    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
            && self.search_queries.is_empty()
            && self.search_strategies.is_empty()
            && self.external_ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.authors
            .iter()
            .chain(&self.search_queries)
            .chain(&self.search_strategies)
            .chain(&self.external_ids)
    }
}

/// One stored asset, normalized from either the remote store or the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Absent for manifest-only entries.
    pub id: Option<String>,
    /// Storage-relative key; the dedup key.
    pub path: String,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub url: Option<String>,
    pub url_expires_at: Option<DateTime<Utc>>,
    pub bucket: Option<String>,
    pub prompt: Option<Prompt>,
    pub keywords: Vec<String>,
    pub links: Vec<String>,
    /// External clustering key ("generated together").
    pub group_id: Option<String>,
    /// Explicit position inside the group.
    pub group_index: Option<u32>,
    pub visibility: Visibility,
    pub source_kind: SourceKind,
    /// Collection the record was listed under.
    pub collection: String,
    pub curated: Option<CuratedFields>,
}

impl RawRecord {
    /// Create a record with just the fields every source provides.
    pub fn new(path: impl Into<String>, created_at: DateTime<Utc>, source_kind: SourceKind) -> Self {
        let path = path.into();
        Self {
            id: None,
            filename: filename_from_path(&path),
            path,
            created_at,
            url: None,
            url_expires_at: None,
            bucket: None,
            prompt: None,
            keywords: Vec::new(),
            links: Vec::new(),
            group_id: None,
            group_index: None,
            visibility: Visibility::Public,
            source_kind,
            collection: String::new(),
            curated: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>, group_index: Option<u32>) -> Self {
        self.group_id = Some(group_id.into());
        self.group_index = group_index;
        self
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Stable identity: the id when present, otherwise the path.
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.path)
    }

    /// True when the cached URL is missing or already expired at `now`.
    pub fn needs_url_refresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.url, self.url_expires_at) {
            (None, _) => true,
            (Some(url), _) if url.is_empty() => true,
            (Some(_), Some(expires_at)) => expires_at < now,
            (Some(_), None) => false,
        }
    }

    pub fn same_id(&self, other: &RawRecord) -> bool {
        matches!((&self.id, &other.id), (Some(a), Some(b)) if a == b)
    }
}

/// Last path segment, or `"image"` for an empty path.
pub fn filename_from_path(path: &str) -> String {
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("image")
        .to_string()
}

/// Parses the timestamp shapes the sources emit: RFC 3339, a naive
/// `YYYY-MM-DDTHH:MM:SS[.f]` (treated as UTC) or a bare date.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    #[test]
    fn test_prompt_from_value() {
        assert_eq!(Prompt::from_value(Value::Null), None);
        assert_eq!(Prompt::from_value(json!("  ")), None);
        assert_eq!(
            Prompt::from_value(json!("a cat")),
            Some(Prompt::Text("a cat".into()))
        );
        let structured = Prompt::from_value(json!({"subject": "Lighthouse"})).unwrap();
        assert!(structured.searchable_text().contains("Lighthouse"));
    }

    #[test]
    fn test_needs_url_refresh() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut record = RawRecord::new("u/1.png", now, SourceKind::Remote);
        assert!(record.needs_url_refresh(now));

        record.url = Some("https://cdn/1.png".into());
        assert!(!record.needs_url_refresh(now));

        record.url_expires_at = Some(now - Duration::minutes(1));
        assert!(record.needs_url_refresh(now));

        record.url_expires_at = Some(now + Duration::hours(1));
        assert!(!record.needs_url_refresh(now));
    }

    #[test]
    fn test_key_falls_back_to_path() {
        let now = Utc::now();
        let record = RawRecord::new("gallery/a.jpg", now, SourceKind::Manifest);
        assert_eq!(record.key(), "gallery/a.jpg");
        assert_eq!(record.filename, "a.jpg");
        assert_eq!(record.with_id("img-1").key(), "img-1");
    }

    #[test]
    fn test_parse_timestamp() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(parse_timestamp("2024-05-06T07:08:09Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-06T09:08:09+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-06T07:08:09.000"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-05-06"),
            Some(Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
