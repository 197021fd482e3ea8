//! HTML parsing and DOM queries.
//!
//! [`Document`] wraps a parsed HTML page and provides CSS-selector
//! queries, while [`Element`] wraps a single node. Both are thin
//! adapters over `scraper` used by the extractor and the metadata
//! probes.

use scraper::{Html, Selector};
use url::Url;

use crate::{BinderyError, Result};

/// A parsed HTML document, optionally rooted at a base URL for
/// relative-link resolution.
pub struct Document {
    html: Html,
    base_url: Option<Url>,
}

impl Document {
    /// Parses an HTML document. scraper tolerates arbitrarily broken
    /// markup, so this only fails downstream on invalid selectors.
    pub fn parse(html: &str) -> Self {
        Self { html: Html::parse_document(html), base_url: None }
    }

    /// Parses an HTML document with a base URL used for resolving
    /// relative image and anchor references.
    pub fn parse_with_base(html: &str, base_url: Url) -> Self {
        Self { html: Html::parse_document(html), base_url: Some(base_url) }
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Selects elements matching a CSS selector, in document order.
    pub fn select(&'_ self, selector: &str) -> Result<Vec<Element<'_>>> {
        let sel = Selector::parse(selector)
            .map_err(|e| BinderyError::HtmlParse(format!("invalid selector: {e}")))?;
        Ok(self.html.select(&sel).map(Element::new).collect())
    }

    /// Content of the `<title>` element, trimmed, if present and
    /// non-empty.
    pub fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        let title: String = self.html.select(&selector).next()?.text().collect();
        let title = title.trim();
        if title.is_empty() { None } else { Some(title.to_string()) }
    }

    /// The `lang` attribute of the root `<html>` element.
    pub fn language(&self) -> Option<String> {
        self.html
            .root_element()
            .value()
            .attr("lang")
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
    }

    /// All text content of the document.
    pub fn text_content(&self) -> String {
        self.html.root_element().text().collect()
    }
}

/// A single element in a parsed document.
#[derive(Clone, Debug)]
pub struct Element<'a> {
    element: scraper::ElementRef<'a>,
}

impl<'a> Element<'a> {
    fn new(element: scraper::ElementRef<'a>) -> Self {
        Self { element }
    }

    pub fn inner_html(&self) -> String {
        self.element.inner_html()
    }

    pub fn outer_html(&self) -> String {
        self.element.html()
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        self.element.text().collect()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.element.value().attr(name)
    }

    /// Lowercase tag name.
    pub fn tag_name(&self) -> String {
        self.element.value().name().to_lowercase()
    }

    /// Selects descendant elements matching a CSS selector.
    pub fn select(&'_ self, selector: &str) -> Result<Vec<Element<'_>>> {
        let sel = Selector::parse(selector)
            .map_err(|e| BinderyError::HtmlParse(format!("invalid selector: {e}")))?;
        Ok(self.element.select(&sel).map(Element::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <!DOCTYPE html>
        <html lang="de">
        <head><title> Probe </title></head>
        <body>
            <p class="lead">First</p>
            <p class="lead">Second</p>
            <a href="/about">About</a>
        </body>
        </html>
    "#;

    #[test]
    fn test_title_trimmed() {
        let doc = Document::parse(SAMPLE);
        assert_eq!(doc.title(), Some("Probe".to_string()));
    }

    #[test]
    fn test_language() {
        let doc = Document::parse(SAMPLE);
        assert_eq!(doc.language(), Some("de".to_string()));
        let doc = Document::parse("<html><body></body></html>");
        assert_eq!(doc.language(), None);
    }

    #[test]
    fn test_select_in_order() {
        let doc = Document::parse(SAMPLE);
        let leads = doc.select("p.lead").unwrap();
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].text(), "First");
        assert_eq!(leads[1].text(), "Second");
    }

    #[test]
    fn test_attr() {
        let doc = Document::parse(SAMPLE);
        let link = &doc.select("a").unwrap()[0];
        assert_eq!(link.attr("href"), Some("/about"));
    }

    #[test]
    fn test_invalid_selector() {
        let doc = Document::parse(SAMPLE);
        assert!(matches!(doc.select("[[nope"), Err(BinderyError::HtmlParse(_))));
    }

    #[test]
    fn test_base_url() {
        let base = Url::parse("https://example.com/a").unwrap();
        let doc = Document::parse_with_base(SAMPLE, base.clone());
        assert_eq!(doc.base_url(), Some(&base));
    }
}
