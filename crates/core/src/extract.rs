//! Readable-content extraction from captured HTML.
//!
//! The extractor turns raw browser-captured markup into a structured
//! article record: it scores block elements to find the main content
//! candidate, sanitizes the winner against the allow-list, computes
//! text metrics, and probes document metadata.
//!
//! A readability miss is not an error: it is returned as
//! [`ExtractionOutcome::Failed`] so the caller can persist the failed
//! capture for later inspection. Only structurally invalid input
//! (oversize HTML, an unparsable source URL) produces an `Err`.

use chrono::{DateTime, Utc};
use url::Url;

use crate::config::Config;
use crate::models::reading_time_minutes;
use crate::parse::{Document, Element};
use crate::sanitize::sanitize_fragment;
use crate::scoring::{ScoreConfig, score_element};
use crate::{BinderyError, Result};

/// Options controlling a single extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Keep `<img>` elements in the sanitized content and report them
    /// for acquisition.
    pub preserve_images: bool,
    /// Minimum character count the top candidate must carry.
    pub char_threshold: usize,
    /// Number of top-scoring candidates to keep in play.
    pub max_candidates: usize,
    /// Raw input size cap in bytes.
    pub max_html_bytes: usize,
    /// Extracted content cap in characters.
    pub max_content_chars: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            preserve_images: true,
            char_threshold: 500,
            max_candidates: 5,
            max_html_bytes: 10 * 1024 * 1024,
            max_content_chars: 500_000,
        }
    }
}

impl ExtractOptions {
    /// Options derived from the pipeline config.
    pub fn from_config(config: &Config, preserve_images: bool) -> Self {
        Self {
            preserve_images,
            max_html_bytes: config.max_html_bytes,
            max_content_chars: config.max_content_chars,
            ..Self::default()
        }
    }
}

/// An image reference discovered in extracted content, before
/// acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub original_url: String,
    pub alt_text: Option<String>,
}

/// A successfully extracted article, pre-persistence.
#[derive(Debug, Clone)]
pub struct ExtractedArticle {
    pub title: String,
    /// Sanitized allow-listed fragment.
    pub content_html: String,
    /// Plain-text rendering used for word count and search.
    pub content_text: String,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub site_name: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// BCP-47 tag, `en` when the document does not declare one.
    pub language: String,
    pub word_count: u32,
    pub reading_time_minutes: u32,
    /// Image references in DOM order of first encounter.
    pub images: Vec<ImageRef>,
}

/// Result of an extraction attempt. Failure carries enough context for
/// the store to record the failed capture.
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    Extracted(Box<ExtractedArticle>),
    Failed {
        /// Document `<title>`, when present.
        title: Option<String>,
        error: String,
        original_html: String,
    },
}

/// Tags scanned as potential content containers.
const CANDIDATE_TAGS: &[&str] =
    &["article", "main", "section", "div", "p", "td", "pre", "blockquote"];

/// Extracts readable content from `raw_html`, using `source_url` as
/// the document base.
///
/// # Errors
///
/// [`BinderyError::HtmlTooLarge`] when the input exceeds the size cap,
/// [`BinderyError::InvalidUrl`] when the source URL does not parse.
/// Readability misses are reported through the returned outcome, not
/// as errors.
pub fn extract(raw_html: &str, source_url: &str, options: &ExtractOptions) -> Result<ExtractionOutcome> {
    if raw_html.len() > options.max_html_bytes {
        return Err(BinderyError::HtmlTooLarge { size: raw_html.len(), cap: options.max_html_bytes });
    }

    let base_url = Url::parse(source_url).map_err(|e| BinderyError::InvalidUrl(e.to_string()))?;
    let doc = Document::parse_with_base(raw_html, base_url.clone());

    let top = match select_top_candidate(&doc, options) {
        Some(element) => element,
        None => {
            return Ok(ExtractionOutcome::Failed {
                title: doc.title(),
                error: "could not isolate readable content".to_string(),
                original_html: raw_html.to_string(),
            });
        }
    };

    let content = truncate_chars(&top.outer_html(), options.max_content_chars);
    let mut content_html = sanitize_fragment(&content, Some(&base_url))?;
    if !options.preserve_images {
        content_html = strip_images(&content_html)?;
    }

    let content_text = fragment_text(&content_html);
    let word_count = content_text.split_whitespace().count() as u32;

    let metadata = doc.probe_metadata();
    let images = if options.preserve_images { collect_image_refs(&content_html) } else { Vec::new() };

    Ok(ExtractionOutcome::Extracted(Box::new(ExtractedArticle {
        title: metadata.title.unwrap_or_else(|| "Untitled".to_string()),
        content_html,
        content_text,
        excerpt: metadata.excerpt,
        author: metadata.byline,
        site_name: metadata.site_name,
        published_at: metadata.published_at,
        language: metadata.language.unwrap_or_else(|| "en".to_string()),
        word_count,
        reading_time_minutes: reading_time_minutes(word_count),
        images,
    })))
}

/// Scores candidate containers and returns the best one meeting the
/// character threshold, considering only the top N by score.
fn select_top_candidate<'a>(doc: &'a Document, options: &ExtractOptions) -> Option<Element<'a>> {
    let score_config = ScoreConfig::default();
    let mut candidates: Vec<(Element<'a>, f64)> = Vec::new();

    for tag in CANDIDATE_TAGS {
        let Ok(elements) = doc.select(tag) else { continue };
        for element in elements {
            let text_len = element.text().chars().count();
            // Structural containers stay in play even when short; they
            // may still hold the winning paragraphs.
            if !matches!(*tag, "article" | "main" | "section") && text_len < options.char_threshold / 10 {
                continue;
            }
            let score = score_element(&element, &score_config);
            candidates.push((element, score));
        }
    }

    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(options.max_candidates.max(1));

    candidates
        .into_iter()
        .map(|(element, _)| element)
        .find(|element| element.text().chars().count() >= options.char_threshold)
}

/// Truncates to at most `cap` characters, on a char boundary.
pub fn truncate_chars(s: &str, cap: usize) -> String {
    match s.char_indices().nth(cap) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Plain text of a sanitized fragment.
fn fragment_text(fragment: &str) -> String {
    let text = Document::parse(fragment).text_content();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Image references in DOM order, following the acquirer's source
/// probe order. `data:` URIs and empty sources are skipped here, the
/// same way the acquirer skips them.
fn collect_image_refs(fragment: &str) -> Vec<ImageRef> {
    let doc = Document::parse(fragment);
    let Ok(imgs) = doc.select("img") else { return Vec::new() };

    imgs.iter()
        .filter_map(|img| {
            let src = crate::images::SRC_PROBES
                .iter()
                .filter_map(|attr| img.attr(attr))
                .map(str::trim)
                .find(|v| !v.is_empty() && !v.starts_with("data:"))?;
            Some(ImageRef {
                original_url: src.to_string(),
                alt_text: img.attr("alt").map(|a| a.to_string()).filter(|a| !a.is_empty()),
            })
        })
        .collect()
}

fn strip_images(fragment: &str) -> Result<String> {
    use lol_html::{RewriteStrSettings, element, rewrite_str};
    rewrite_str(
        fragment,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("img", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("figure", |el| {
                    // Keep captions; the raster itself is gone.
                    el.remove_and_keep_content();
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| BinderyError::HtmlParse(e.to_string()))
}
