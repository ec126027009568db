//! Core domain model for the Creator Content Pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "ccp-core";

/// Production stage a piece of content moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Idea,
    InProgress,
    Filmed,
    Edited,
    Posted,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idea => "idea",
            Status::InProgress => "in-progress",
            Status::Filmed => "filmed",
            Status::Edited => "edited",
            Status::Posted => "posted",
        }
    }
}

/// Persisted content entity. Field names serialize camelCase so the JSON
/// file stays readable by the existing dashboard frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub hashtags: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub created_date: String,
    #[serde(default)]
    pub tiktok_url: String,
    #[serde(default)]
    pub instagram_url: String,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub shares: u64,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_imported: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
}

impl ContentRecord {
    pub fn new(id: String, title: String) -> Self {
        Self {
            id,
            title,
            summary: String::new(),
            header: String::new(),
            caption: String::new(),
            hashtags: String::new(),
            status: Status::Idea,
            due_date: String::new(),
            created_date: String::new(),
            tiktok_url: String::new(),
            instagram_url: String::new(),
            views: 0,
            likes: 0,
            comments: 0,
            shares: 0,
            category: String::new(),
            last_imported: None,
            last_synced: None,
        }
    }
}

/// Reconciled, typed result of applying a column mapping to one raw CSV row.
///
/// Numeric fields are `None` when the source column was unmapped and
/// `Some(n)` when the column existed, even if the cell failed to parse
/// (which coerces to 0). The merge layer relies on that distinction: a
/// present-but-zero count overwrites the stored value, an absent column
/// preserves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    pub title: String,
    pub views: Option<u64>,
    pub likes: Option<u64>,
    pub comments: Option<u64>,
    pub shares: Option<u64>,
    pub due_date: String,
    pub tiktok_url: String,
    pub instagram_url: String,
    pub hashtags: String,
    pub category: String,
}

impl ImportRecord {
    /// A record with no title and no views carries no identifying signal
    /// and is dropped from the import stream.
    pub fn has_signal(&self) -> bool {
        !self.title.is_empty() || self.views.unwrap_or(0) > 0
    }
}

/// Per-platform account stats captured during a metrics sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccountStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiktok: Option<PlatformAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<PlatformAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformAccount {
    pub username: String,
    pub followers: u64,
    #[serde(default)]
    pub following: u64,
    #[serde(default)]
    pub media_count: u64,
    pub synced_at: DateTime<Utc>,
}

pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        let back: Status = serde_json::from_str("\"posted\"").unwrap();
        assert_eq!(back, Status::Posted);
    }

    #[test]
    fn content_record_round_trips_camel_case() {
        let mut record = ContentRecord::new("abc".into(), "Garden tour".into());
        record.tiktok_url = "https://tiktok.com/video/1".into();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tiktokUrl"], "https://tiktok.com/video/1");
        assert!(json.get("lastImported").is_none());
        let back: ContentRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn dashboard_format_item_keeps_its_header() {
        // Items written by the existing dashboard carry the generated hook
        // text; loading and re-saving the file must not drop it.
        let json = serde_json::json!({
            "id": "abc",
            "title": "Garden tour",
            "header": "Wait for the reveal 🌱",
            "status": "posted",
        });
        let record: ContentRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.header, "Wait for the reveal 🌱");
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["header"], "Wait for the reveal 🌱");
    }

    #[test]
    fn signal_rule_keeps_viewed_untitled_rows() {
        let empty = ImportRecord::default();
        assert!(!empty.has_signal());

        let viewed = ImportRecord {
            views: Some(10),
            ..ImportRecord::default()
        };
        assert!(viewed.has_signal());

        let zero_views_present = ImportRecord {
            views: Some(0),
            ..ImportRecord::default()
        };
        assert!(!zero_views_present.has_signal());
    }
}
