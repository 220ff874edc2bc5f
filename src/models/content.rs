//! Course content data structures.

use serde::{Deserialize, Serialize};

/// A downloadable item posted under a week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub title: String,
    pub download_url: Option<String>,
}

/// One week block of a course page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekItem {
    pub week_name: String,
    #[serde(default)]
    pub announcement: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub contents: Vec<ContentEntry>,
}

impl WeekItem {
    /// The fixed item every combined result carries.
    pub fn placeholder() -> Self {
        Self {
            week_name: "Mock Week".to_string(),
            announcement: String::new(),
            description: "Placeholder".to_string(),
            contents: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        *self == Self::placeholder()
    }
}

/// The course-wide announcement panel, as raw HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementItem {
    pub course_announcement: String,
}

/// An element of a combined content result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentItem {
    Announcement(AnnouncementItem),
    Week(WeekItem),
}

/// Announcement (optional), placeholder, then weeks.
pub type CombinedContent = Vec<ContentItem>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_items_deserialize_by_shape() {
        let json = r#"[
            {"course_announcement": "<p>Quiz moved</p>"},
            {"week_name": "Mock Week", "announcement": "", "description": "Placeholder", "contents": []},
            {"week_name": "Week: 2025-03-01", "contents": [{"title": "Lecture 1", "download_url": null}]}
        ]"#;
        let items: CombinedContent = serde_json::from_str(json).unwrap();

        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], ContentItem::Announcement(a) if a.course_announcement == "<p>Quiz moved</p>"));
        assert!(matches!(&items[1], ContentItem::Week(w) if w.is_placeholder()));
        assert!(matches!(&items[2], ContentItem::Week(w) if w.contents.len() == 1));
    }
}
