//! Persistent record types: articles, images, exports, settings, and
//! the list-filtering types accepted by the store.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{BinderyError, Result};

/// A captured article. `canonical_url` is the business key; the exact
/// string supplied at ingestion, never normalized.
#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub id: i64,
    pub canonical_url: String,
    pub original_url: String,
    pub title: String,
    pub content_html: Option<String>,
    pub content_text: Option<String>,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub site_name: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// BCP-47 language tag, default `en`.
    pub language: String,
    pub word_count: u32,
    pub reading_time_minutes: u32,
    pub has_images: bool,
    pub image_count: u32,
    pub capture_success: bool,
    pub capture_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_archived: bool,
    pub is_favorite: bool,
}

/// Article attributes produced by extraction, before the store assigns
/// an id and timestamps.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub canonical_url: String,
    pub original_url: String,
    pub title: String,
    pub content_html: String,
    pub content_text: String,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub site_name: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub language: String,
    pub word_count: u32,
    pub reading_time_minutes: u32,
}

/// A rehosted image row. `local_path` always begins with `/images/`.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRecord {
    pub id: i64,
    pub article_id: i64,
    pub original_url: String,
    pub local_path: String,
    pub alt_text: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size_bytes: Option<u64>,
}

/// An acquired image descriptor, pre-persistence.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub original_url: String,
    pub local_path: String,
    pub alt_text: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size_bytes: Option<u64>,
}

/// A generated EPUB artifact.
#[derive(Debug, Clone, Serialize)]
pub struct Export {
    pub id: i64,
    pub name: String,
    pub article_count: u32,
    pub file_path: String,
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
    pub sent_to_kindle: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

/// A delivery-configuration key/value pair.
#[derive(Debug, Clone, Serialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Keys the settings table recognizes.
pub const RECOGNIZED_SETTING_KEYS: &[&str] = &[
    "KINDLE_EMAIL",
    "SMTP_HOST",
    "SMTP_PORT",
    "SMTP_SECURE",
    "SMTP_USER",
    "SMTP_PASSWORD",
    "FROM_EMAIL",
];

/// Replacement token for masked secrets in list-all responses.
pub const MASKED_VALUE: &str = "********";

/// Built-in default for a setting key, if any.
pub fn setting_default(key: &str) -> Option<&'static str> {
    match key {
        "SMTP_PORT" => Some("587"),
        _ => None,
    }
}

/// Whether a setting value must be masked when listed.
pub fn setting_is_secret(key: &str) -> bool {
    key == "SMTP_PASSWORD"
}

/// Sort orders accepted by the article list operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    CreatedDesc,
    CreatedAsc,
    TitleAsc,
    TitleDesc,
    ReadingTimeAsc,
}

impl SortKey {
    /// Parses a sort key string. Unrecognized values fall back to
    /// `created_at desc`.
    pub fn parse(value: &str) -> Self {
        match value {
            "created_at_desc" | "created_at desc" => Self::CreatedDesc,
            "created_at_asc" | "created_at asc" => Self::CreatedAsc,
            "title_asc" | "title asc" => Self::TitleAsc,
            "title_desc" | "title desc" => Self::TitleDesc,
            "reading_time_asc" | "reading_time asc" => Self::ReadingTimeAsc,
            _ => Self::CreatedDesc,
        }
    }

    pub(crate) fn order_clause(self) -> &'static str {
        match self {
            Self::CreatedDesc => "created_at DESC",
            Self::CreatedAsc => "created_at ASC",
            Self::TitleAsc => "title COLLATE NOCASE ASC",
            Self::TitleDesc => "title COLLATE NOCASE DESC",
            Self::ReadingTimeAsc => "reading_time_minutes ASC",
        }
    }
}

/// Filter accepted by the article list operation.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    /// Substring match across title, content text, and excerpt.
    pub search: Option<String>,
    pub is_archived: Option<bool>,
    pub is_favorite: Option<bool>,
    pub sort: SortKey,
}

/// One-based pagination with a bounded page size.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Result<Self> {
        if page < 1 {
            return Err(BinderyError::Validation("page must be >= 1".to_string()));
        }
        if limit < 1 || limit > 100 {
            return Err(BinderyError::Validation("limit must be between 1 and 100".to_string()));
        }
        Ok(Self { page, limit })
    }

    pub(crate) fn offset(self) -> u32 {
        (self.page - 1) * self.limit
    }
}

/// Mutable article fields for the update operation. Any other field is
/// rejected at the boundary.
#[derive(Debug, Clone, Default)]
pub struct ArticlePatch {
    pub title: Option<String>,
    pub is_archived: Option<bool>,
    pub is_favorite: Option<bool>,
}

impl ArticlePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.is_archived.is_none() && self.is_favorite.is_none()
    }
}

/// Reading time estimate at 200 words per minute, with a one-minute
/// floor.
pub fn reading_time_minutes(word_count: u32) -> u32 {
    word_count.div_ceil(200).max(1)
}
