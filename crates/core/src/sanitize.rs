//! Allow-list HTML sanitization.
//!
//! Untrusted captured markup is reduced to block and inline text
//! structure plus `figure`, `figcaption`, `img`, and `a`. Scripts,
//! frames, embeds, and event handlers never survive; unknown tags are
//! unwrapped so their text content is kept. When a base URL is known,
//! `img` and `a` references are resolved to absolute URLs so the
//! acquirer and the EPUB composer see stable addresses.

use lol_html::{RewriteStrSettings, doc_comments, element, rewrite_str};
use url::Url;

use crate::{BinderyError, Result};

/// Tags kept as-is (subject to attribute filtering).
const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "article", "b", "blockquote", "br", "caption", "cite", "code", "dd", "div", "dl",
    "dt", "em", "figcaption", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "img", "li",
    "mark", "ol", "p", "pre", "q", "s", "section", "small", "span", "strong", "sub", "sup",
    "table", "tbody", "td", "tfoot", "th", "thead", "time", "tr", "u", "ul",
];

/// Tags removed together with their content.
const REMOVE_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "svg", "math", "form",
    "button", "select", "textarea", "canvas", "video", "audio", "link", "meta",
];

/// Attributes kept on allowed tags; everything else, including all
/// `on*` handlers, is stripped. `data-*` attributes are kept because
/// the image acquirer probes them for lazy-loaded sources.
const ALLOWED_ATTRIBUTES: &[&str] = &[
    "href", "src", "alt", "title", "width", "height", "class", "style", "loading", "target", "rel",
];

fn attribute_allowed(name: &str) -> bool {
    ALLOWED_ATTRIBUTES.contains(&name) || name.starts_with("data-")
}

/// Sanitizes an HTML fragment against the allow-list. Comments are
/// dropped. The output is a fragment, not a full document.
pub fn sanitize_fragment(html: &str, base_url: Option<&Url>) -> Result<String> {
    let base = base_url.cloned();

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", move |el| {
                let tag = el.tag_name().to_lowercase();

                if REMOVE_WITH_CONTENT.contains(&tag.as_str()) {
                    el.remove();
                    return Ok(());
                }
                if !ALLOWED_TAGS.contains(&tag.as_str()) {
                    el.remove_and_keep_content();
                    return Ok(());
                }

                let names: Vec<String> = el.attributes().iter().map(|a| a.name()).collect();
                for name in &names {
                    if !attribute_allowed(name) {
                        el.remove_attribute(name);
                    }
                }

                if let Some(base) = &base {
                    match tag.as_str() {
                        "img" => {
                            for attr in crate::images::SRC_PROBES {
                                resolve_attribute(el, attr, base)?;
                            }
                        }
                        "a" => resolve_attribute(el, "href", base)?,
                        _ => {}
                    }
                }

                Ok(())
            })],
            document_content_handlers: vec![doc_comments!(|c| {
                c.remove();
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| BinderyError::HtmlParse(e.to_string()))
}

/// Rewrites a single URL attribute to its absolute form. `data:` URIs
/// and values that already parse as absolute are left alone.
fn resolve_attribute(
    el: &mut lol_html::html_content::Element,
    attr: &str,
    base: &Url,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(value) = el.get_attribute(attr) {
        let value = value.trim().to_string();
        if value.is_empty() || value.starts_with("data:") || Url::parse(&value).is_ok() {
            return Ok(());
        }
        if let Ok(absolute) = base.join(&value) {
            el.set_attribute(attr, absolute.as_str())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitize(html: &str) -> String {
        sanitize_fragment(html, None).unwrap()
    }

    #[test]
    fn test_script_removed_with_content() {
        let out = sanitize("<p>before</p><script>alert(1)</script><p>after</p>");
        assert!(!out.contains("script"));
        assert!(!out.contains("alert"));
        assert!(out.contains("before") && out.contains("after"));
    }

    #[test]
    fn test_iframe_and_embed_removed() {
        let out = sanitize(r#"<iframe src="https://evil.test"></iframe><embed src="x"><object data="y"></object>"#);
        assert!(!out.contains("iframe"));
        assert!(!out.contains("embed"));
        assert!(!out.contains("object"));
    }

    #[test]
    fn test_event_handlers_stripped() {
        let out = sanitize(r#"<p onclick="steal()" onmouseover="track()">text</p>"#);
        assert!(!out.contains("onclick"));
        assert!(!out.contains("onmouseover"));
        assert!(out.contains("<p>text</p>"));
    }

    #[test]
    fn test_unknown_tags_unwrapped() {
        let out = sanitize("<custom-widget><p>kept</p></custom-widget>");
        assert!(!out.contains("custom-widget"));
        assert!(out.contains("<p>kept</p>"));
    }

    #[test]
    fn test_allowed_attributes_survive() {
        let out = sanitize(r#"<img src="a.jpg" alt="pic" width="10" height="20" data-src="b.jpg" srcset="x 1w">"#);
        assert!(out.contains(r#"src="a.jpg""#));
        assert!(out.contains(r#"alt="pic""#));
        assert!(out.contains(r#"data-src="b.jpg""#));
        assert!(!out.contains("srcset"));
    }

    #[test]
    fn test_comments_dropped() {
        let out = sanitize("<p>a</p><!-- secret -->");
        assert!(!out.contains("secret"));
    }

    #[test]
    fn test_relative_urls_resolved() {
        let base = Url::parse("https://example.com/posts/1").unwrap();
        let out =
            sanitize_fragment(r#"<img src="/pics/cat.jpg"><a href="two">next</a>"#, Some(&base)).unwrap();
        assert!(out.contains(r#"src="https://example.com/pics/cat.jpg""#));
        assert!(out.contains(r#"href="https://example.com/posts/two""#));
    }

    #[test]
    fn test_data_uri_untouched() {
        let base = Url::parse("https://example.com/").unwrap();
        let out = sanitize_fragment(r#"<img src="data:image/png;base64,AAAA">"#, Some(&base)).unwrap();
        assert!(out.contains("data:image/png;base64,AAAA"));
    }

    #[test]
    fn test_style_tag_removed_style_attr_kept() {
        let out = sanitize(r#"<style>p{color:red}</style><p style="margin:0">x</p>"#);
        assert!(!out.contains("color:red"));
        assert!(out.contains(r#"style="margin:0""#));
    }
}
