//! Document metadata probing.
//!
//! Each field is resolved through a fallback chain: JSON-LD first,
//! then OpenGraph/Twitter meta tags, then plain meta tags, then
//! element heuristics. Probes never fail; absent metadata stays
//! `None`.

use chrono::{DateTime, NaiveDate, Utc};

use crate::parse::Document;

/// Metadata extracted from a captured page.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub title: Option<String>,
    pub byline: Option<String>,
    pub site_name: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub excerpt: Option<String>,
    pub language: Option<String>,
}

impl Document {
    /// Title fallback chain: JSON-LD `headline` → `og:title` →
    /// `twitter:title` → `<title>` → first `<h1>`.
    pub fn probe_title(&self) -> Option<String> {
        if let Some(value) = self.json_ld_string("headline") {
            return Some(value);
        }
        if let Some(title) = self.meta_content("og:title").or_else(|| self.meta_content("twitter:title")) {
            return Some(title);
        }
        if let Some(title) = self.title() {
            return Some(title);
        }
        if let Ok(headings) = self.select("h1")
            && let Some(first) = headings.first()
        {
            let text = first.text();
            let text = text.trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
        None
    }

    /// Byline fallback chain: JSON-LD `author.name` → meta `author` →
    /// `[rel=author]` → `[itemprop=author]` → byline-ish class names.
    pub fn probe_byline(&self) -> Option<String> {
        if let Some(json_ld) = self.json_ld()
            && let Some(author) = json_ld.get("author")
            && let Some(name) = author_name(author)
        {
            return Some(name);
        }
        if let Some(author) = self.meta_content("author") {
            return Some(author);
        }
        for selector in ["[rel=\"author\"]", "[itemprop=\"author\"]"] {
            if let Ok(elements) = self.select(selector)
                && let Some(first) = elements.first()
            {
                let text = first.text();
                let text = text.trim();
                if !text.is_empty() && text.len() < 100 {
                    return Some(text.to_string());
                }
            }
        }
        for pattern in ["byline", "author"] {
            let selector = format!("[class*=\"{pattern}\"]");
            if let Ok(elements) = self.select(&selector) {
                for el in elements.iter().take(3) {
                    let text = el.text();
                    let text = text.trim();
                    if !text.is_empty() && text.len() < 100 {
                        return Some(text.to_string());
                    }
                }
            }
        }
        None
    }

    /// Site name fallback chain: JSON-LD `publisher.name` →
    /// `og:site_name` → base URL domain.
    pub fn probe_site_name(&self) -> Option<String> {
        if let Some(json_ld) = self.json_ld()
            && let Some(name) = json_ld
                .get("publisher")
                .and_then(|p| p.get("name"))
                .and_then(|n| n.as_str())
        {
            return Some(name.to_string());
        }
        if let Some(site) = self.meta_content("og:site_name") {
            return Some(site);
        }
        self.base_url().and_then(|u| u.domain()).map(|d| d.to_string())
    }

    /// Publication instant fallback chain: JSON-LD `datePublished` →
    /// meta `article:published_time` → `<time datetime>` → meta `date`.
    pub fn probe_published_at(&self) -> Option<DateTime<Utc>> {
        let raw = self
            .json_ld_string("datePublished")
            .or_else(|| self.meta_content("article:published_time"))
            .or_else(|| {
                self.select("time[datetime]")
                    .ok()?
                    .first()
                    .and_then(|el| el.attr("datetime"))
                    .map(|s| s.to_string())
            })
            .or_else(|| self.meta_content("date"))?;
        parse_instant(&raw)
    }

    /// Excerpt fallback chain: JSON-LD `description` →
    /// `og:description` → meta `description` → first substantial
    /// paragraph, clipped to 300 characters.
    pub fn probe_excerpt(&self) -> Option<String> {
        if let Some(value) = self.json_ld_string("description") {
            return Some(value);
        }
        if let Some(desc) = self.meta_content("og:description").or_else(|| self.meta_content("description")) {
            return Some(desc);
        }
        if let Ok(paragraphs) = self.select("p") {
            for el in paragraphs.iter().take(5) {
                let text = el.text();
                let text = text.trim();
                if text.chars().count() > 50 {
                    let clipped: String = text.chars().take(300).collect();
                    return Some(if clipped.len() < text.len() { format!("{clipped}...") } else { clipped });
                }
            }
        }
        None
    }

    /// All metadata probes at once.
    pub fn probe_metadata(&self) -> Metadata {
        Metadata {
            title: self.probe_title(),
            byline: self.probe_byline(),
            site_name: self.probe_site_name(),
            published_at: self.probe_published_at(),
            excerpt: self.probe_excerpt(),
            language: self.language(),
        }
    }

    /// Meta tag content, matched on either `name` or `property`.
    fn meta_content(&self, attr: &str) -> Option<String> {
        for key in ["name", "property"] {
            let selector = format!("meta[{key}=\"{attr}\"]");
            if let Ok(elements) = self.select(&selector)
                && let Some(el) = elements.first()
                && let Some(content) = el.attr("content")
            {
                let content = content.trim();
                if !content.is_empty() {
                    return Some(content.to_string());
                }
            }
        }
        None
    }

    /// First parsable `application/ld+json` block, if any.
    fn json_ld(&self) -> Option<serde_json::Value> {
        let blocks = self.select("script[type=\"application/ld+json\"]").ok()?;
        for block in blocks {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&block.inner_html()) {
                // Some sites wrap the object in a one-element array.
                if let Some(first) = value.as_array().and_then(|a| a.first()) {
                    return Some(first.clone());
                }
                return Some(value);
            }
        }
        None
    }

    fn json_ld_string(&self, key: &str) -> Option<String> {
        self.json_ld()?.get(key)?.as_str().map(|s| s.to_string())
    }
}

fn author_name(author: &serde_json::Value) -> Option<String> {
    if let Some(name) = author.as_str() {
        return Some(name.to_string());
    }
    if let Some(name) = author.get("name").and_then(|n| n.as_str()) {
        return Some(name.to_string());
    }
    author
        .as_array()
        .and_then(|a| a.first())
        .and_then(|first| first.get("name"))
        .and_then(|n| n.as_str())
        .map(|s| s.to_string())
}

/// Parses an ISO-8601 instant, accepting a bare date as midnight UTC.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw.trim()) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }
    None
}
