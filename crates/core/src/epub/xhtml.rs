//! HTML-to-XHTML normalization for EPUB content documents.
//!
//! EPUB reading systems parse chapters as XML, so stored fragments
//! must be made well-formed: named entities become numeric references,
//! bare ampersands are escaped, and void elements self-close. Every
//! pass here is idempotent, so re-normalizing already-normalized
//! content is a no-op.

use std::sync::OnceLock;

use lol_html::{RewriteStrSettings, element, rewrite_str};
use regex::Regex;

use crate::{BinderyError, Result};

/// HTML named entities that are not predefined in XML, mapped to
/// numeric character references.
const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", "&#160;"),
    ("&ndash;", "&#8211;"),
    ("&mdash;", "&#8212;"),
    ("&lsquo;", "&#8216;"),
    ("&rsquo;", "&#8217;"),
    ("&ldquo;", "&#8220;"),
    ("&rdquo;", "&#8221;"),
    ("&hellip;", "&#8230;"),
    ("&copy;", "&#169;"),
    ("&reg;", "&#174;"),
    ("&trade;", "&#8482;"),
];

const VOID_ELEMENTS: &str = "br|hr|img|meta|link|input|area|base|col|embed|param|source|track|wbr";

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&(?:(#[0-9]+|#x[0-9a-fA-F]+|amp|lt|gt|quot|apos);)?").unwrap()
    })
}

fn void_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Attribute span is quote-aware: `>` inside a quoted attribute
    // value does not terminate the tag.
    RE.get_or_init(|| {
        Regex::new(&format!(
            r##"<({VOID_ELEMENTS})\b((?:[^>"']|"[^"]*"|'[^']*')*?)\s*/?>"##
        ))
        .unwrap()
    })
}

/// Escapes text for interpolation into XML content or attributes.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Converts a sanitized HTML fragment to well-formed XHTML.
pub fn html_to_xhtml(fragment: &str) -> Result<String> {
    let unwrapped = unwrap_media_wrappers(fragment)?;
    let mut text = unwrapped;
    for (named, numeric) in NAMED_ENTITIES {
        if text.contains(named) {
            text = text.replace(named, numeric);
        }
    }
    let text = escape_stray_ampersands(&text);
    let text = self_close_voids(&text);
    Ok(text)
}

/// Drops `<picture>`/`<source>` wrappers, keeping the inner `<img>`.
fn unwrap_media_wrappers(fragment: &str) -> Result<String> {
    if !fragment.contains("<picture") && !fragment.contains("<source") {
        return Ok(fragment.to_string());
    }
    rewrite_str(
        fragment,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("picture", |el| {
                    el.remove_and_keep_content();
                    Ok(())
                }),
                element!("source", |el| {
                    el.remove();
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| BinderyError::HtmlParse(e.to_string()))
}

/// Escapes `&` not already starting a recognized entity. Entities that
/// XML predefines and numeric references pass through untouched.
fn escape_stray_ampersands(text: &str) -> String {
    entity_re()
        .replace_all(text, |caps: &regex::Captures| {
            if caps.get(1).is_some() {
                caps[0].to_string()
            } else {
                "&amp;".to_string()
            }
        })
        .into_owned()
}

/// Rewrites void elements to self-closing form.
fn self_close_voids(text: &str) -> String {
    void_re().replace_all(text, "<${1}${2} />").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_xml_all_specials() {
        assert_eq!(escape_xml(r#"a&b<c>d"e'f"#), "a&amp;b&lt;c&gt;d&quot;e&apos;f");
    }

    #[test]
    fn test_named_entities_become_numeric() {
        let out = html_to_xhtml("<p>a&nbsp;b&mdash;c&hellip;</p>").unwrap();
        assert_eq!(out, "<p>a&#160;b&#8212;c&#8230;</p>");
    }

    #[test]
    fn test_stray_ampersand_escaped() {
        let out = html_to_xhtml("<p>Q&A and R&amp;D &#160; &lt;</p>").unwrap();
        assert_eq!(out, "<p>Q&amp;A and R&amp;D &#160; &lt;</p>");
    }

    #[test]
    fn test_void_elements_self_close() {
        let out = html_to_xhtml(r#"<p>a<br>b<hr><img src="/images/x/a.jpg" alt="x"></p>"#).unwrap();
        assert_eq!(out, r#"<p>a<br />b<hr /><img src="/images/x/a.jpg" alt="x" /></p>"#);
    }

    #[test]
    fn test_void_attribute_value_may_contain_gt() {
        let input = r#"<p><img src="/images/x/a.jpg" alt="width > 600px"></p>"#;
        let once = html_to_xhtml(input).unwrap();
        assert_eq!(once, r#"<p><img src="/images/x/a.jpg" alt="width > 600px" /></p>"#);
        assert_eq!(html_to_xhtml(&once).unwrap(), once);
    }

    #[test]
    fn test_picture_unwrapped() {
        let out = html_to_xhtml(
            r#"<picture><source srcset="a.webp"><img src="/images/x/a.jpg"></picture>"#,
        )
        .unwrap();
        assert_eq!(out, r#"<img src="/images/x/a.jpg" />"#);
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "<p>Q&A &mdash; tips&nbsp;here</p>",
            r#"<p><img src="/images/x/a.jpg"><br>text & more</p>"#,
            "<p>already &amp; clean &#8212; fine<br /></p>",
        ];
        for input in inputs {
            let once = html_to_xhtml(input).unwrap();
            let twice = html_to_xhtml(&once).unwrap();
            assert_eq!(once, twice, "normalization must be idempotent for {input:?}");
        }
    }

    #[test]
    fn test_already_self_closed_unchanged() {
        let input = r#"<img src="a.jpg" />"#;
        assert_eq!(html_to_xhtml(input).unwrap(), input);
    }
}
