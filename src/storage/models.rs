use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One captured clipboard snapshot. `timestamp` (ms since epoch) is also
/// the entry's identifier and storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardEntry {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub html: String,
    pub timestamp: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ClipboardEntry {
    pub fn new(text: String, html: String, timestamp: i64) -> Self {
        Self {
            text,
            html,
            timestamp,
            tags: Vec::new(),
        }
    }

    /// Returned when nothing matches.
    pub fn empty() -> Self {
        Self::new(String::new(), String::new(), 0)
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp == 0 && self.text.is_empty() && self.html.is_empty()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Text and/or tag filter. An empty field does not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tag: String,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tag: tag.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text, "")
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Self::new("", tag)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.tag.is_empty()
    }

    /// Case-insensitive substring on `text`, exact membership on tags, AND-ed.
    pub fn matches(&self, entry: &ClipboardEntry) -> bool {
        if !self.text.is_empty()
            && !entry
                .text
                .to_lowercase()
                .contains(&self.text.to_lowercase())
        {
            return false;
        }
        if !self.tag.is_empty() && !entry.has_tag(&self.tag) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, tags: &[&str]) -> ClipboardEntry {
        ClipboardEntry {
            text: text.to_string(),
            html: String::new(),
            timestamp: 100,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_entry_is_sentinel() {
        let e = ClipboardEntry::empty();
        assert_eq!(e.text, "");
        assert_eq!(e.html, "");
        assert_eq!(e.timestamp, 0);
        assert!(e.tags.is_empty());
        assert!(e.is_empty());
    }

    #[test]
    fn test_missing_fields_default() {
        let e: ClipboardEntry =
            serde_json::from_str(r#"{"text":"hi","html":"<i>hi</i>","timestamp":42}"#).unwrap();
        assert_eq!(e.timestamp, 42);
        assert!(e.tags.is_empty());
    }

    #[test]
    fn test_query_text_case_insensitive() {
        let q = SearchQuery::text("WORLD");
        assert!(q.matches(&entry("hello world", &[])));
        assert!(!SearchQuery::text("xyz").matches(&entry("hello world", &[])));
    }

    #[test]
    fn test_query_tag_exact() {
        let e = entry("x", &["work"]);
        assert!(SearchQuery::tag("work").matches(&e));
        assert!(!SearchQuery::tag("Work").matches(&e));
        assert!(!SearchQuery::tag("wor").matches(&e));
    }

    #[test]
    fn test_query_and_combination() {
        let e = entry("meeting notes", &["work"]);
        assert!(SearchQuery::new("notes", "work").matches(&e));
        assert!(!SearchQuery::new("notes", "home").matches(&e));
        assert!(!SearchQuery::new("recipe", "work").matches(&e));
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let q = SearchQuery::default();
        assert!(q.is_empty());
        assert!(q.matches(&entry("", &[])));
    }

    #[test]
    fn test_captured_at() {
        let e = ClipboardEntry::new(String::new(), String::new(), 1_700_000_000_000);
        assert_eq!(e.captured_at().unwrap().timestamp(), 1_700_000_000);
    }
}
