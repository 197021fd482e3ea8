//! Content-candidate scoring.
//!
//! Scores combine a base score per tag, a class/id pattern weight, a
//! text-density score, and a link-density penalty. Higher scores mean
//! "more likely to be the main article body".

use regex::Regex;
use std::sync::OnceLock;

use crate::parse::Element;

/// Scoring parameters. Defaults match the extraction thresholds used
/// by the pipeline.
#[derive(Debug, Clone)]
pub struct ScoreConfig {
    /// Weight for positive class/id patterns.
    pub positive_weight: f64,
    /// Weight for negative class/id patterns.
    pub negative_weight: f64,
    /// Characters of text per density point.
    pub chars_per_point: usize,
    /// Cap on the character-density contribution.
    pub max_char_density: f64,
    /// Cap on the comma-density contribution.
    pub max_comma_density: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            positive_weight: 25.0,
            negative_weight: -25.0,
            chars_per_point: 100,
            max_char_density: 3.0,
            max_comma_density: 3.0,
        }
    }
}

const POSITIVE_PATTERNS: &str =
    r"(?i)(article|body|content|entry|main|page|post|text|blog|story)";
const NEGATIVE_PATTERNS: &str = r"(?i)(banner|breadcrumbs?|comment|community|disqus|extra|foot|header|menu|related|remark|rss|share|shoutbox|sidebar|sponsor|ad-break|pagination|pager|popup|promo)";

fn positive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(POSITIVE_PATTERNS).unwrap())
}

fn negative_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NEGATIVE_PATTERNS).unwrap())
}

/// Base score per tag. Containers likely to hold body copy score
/// positive; navigation and heading chrome scores negative.
pub fn base_tag_score(tag: &str) -> f64 {
    match tag {
        "article" | "main" => 10.0,
        "section" => 8.0,
        "div" => 5.0,
        "td" | "blockquote" | "pre" => 3.0,
        "form" | "address" | "ol" | "ul" | "dl" | "dd" | "dt" | "li" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" | "header" | "footer" | "nav" => -5.0,
        _ => 0.0,
    }
}

/// Class/id weight adjustment. Positive patterns win over negative
/// ones when both match.
pub fn class_id_weight(element: &Element<'_>, config: &ScoreConfig) -> f64 {
    for attr in ["id", "class"] {
        if let Some(value) = element.attr(attr) {
            for token in value.split_whitespace() {
                if positive_regex().is_match(token) {
                    return config.positive_weight;
                }
                if negative_regex().is_match(token) {
                    return config.negative_weight;
                }
            }
        }
    }
    0.0
}

/// Text-density contribution from character and comma counts, each
/// capped.
pub fn text_density(element: &Element<'_>, config: &ScoreConfig) -> f64 {
    let text = element.text();
    let char_score =
        ((text.chars().count() / config.chars_per_point) as f64).min(config.max_char_density);
    let comma_score = (text.matches(',').count() as f64).min(config.max_comma_density);
    char_score + comma_score
}

/// Ratio of anchor text to total text, from 0.0 to 1.0.
pub fn link_density(element: &Element<'_>) -> f64 {
    let total = element.text().chars().count();
    if total == 0 {
        return 0.0;
    }
    let linked: usize = element
        .select("a")
        .unwrap_or_default()
        .iter()
        .map(|a| a.text().chars().count())
        .sum();
    linked as f64 / total as f64
}

/// Final candidate score. Link-heavy elements are penalized
/// proportionally, softened for elements that carry a positive
/// class/id pattern or substantial prose.
pub fn score_element(element: &Element<'_>, config: &ScoreConfig) -> f64 {
    let base = base_tag_score(&element.tag_name());
    let class_weight = class_id_weight(element, config);
    let density = text_density(element, config);
    let ld = link_density(element);

    let content_rich = element.text().chars().count() > 500;
    let penalty = if class_weight > 0.0 || content_rich { 1.0 - ld * 0.5 } else { 1.0 - ld };

    (base + class_weight + density) * penalty
}
