//! EPUB assembly: chapter rendering, image embedding, cover
//! generation, and container packaging.

mod package;
pub mod xhtml;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat, Utc};
use lol_html::{RewriteStrSettings, element, rewrite_str};

use crate::cover::{CoverOptions, CoverSynthesizer};
use crate::models::{Article, Export};
use crate::slug::slug;
use crate::store::Store;
use crate::{BinderyError, Result};

pub use package::{Chapter, PackageMeta, Resource, STYLE_CSS, write_package};
pub use xhtml::{escape_xml, html_to_xhtml};

pub const MAX_EXPORT_ARTICLES: usize = 100;

const DEFAULT_AUTHOR: &str = "Bookmark Digest";

/// Caller-supplied export knobs. Everything has a derived default.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub title: Option<String>,
    pub author: Option<String>,
    /// Background image for the synthesized cover.
    pub cover_background: Option<PathBuf>,
}

/// Builds EPUB files from stored articles.
pub struct EpubComposer {
    export_dir: PathBuf,
    images_root: PathBuf,
}

impl EpubComposer {
    pub fn new(export_dir: impl Into<PathBuf>, images_root: impl Into<PathBuf>) -> Self {
        Self { export_dir: export_dir.into(), images_root: images_root.into() }
    }

    /// Composes an EPUB from the given article ids and records the
    /// export. Chapters are ordered by publication date, oldest first,
    /// with ingestion order breaking ties. Ids that do not resolve to
    /// a successful capture are skipped; an empty result is an error.
    pub async fn compose(
        &self,
        store: &Store,
        ids: Vec<i64>,
        options: ExportOptions,
    ) -> Result<Export> {
        if ids.is_empty() {
            return Err(BinderyError::Validation("no article ids supplied".to_string()));
        }
        if ids.len() > MAX_EXPORT_ARTICLES {
            return Err(BinderyError::Validation(format!(
                "at most {MAX_EXPORT_ARTICLES} articles per export"
            )));
        }
        if let Some(bad) = ids.iter().find(|id| **id <= 0) {
            return Err(BinderyError::Validation(format!("invalid article id {bad}")));
        }

        let articles = store.get_exportable_articles(ids).await?;
        if articles.is_empty() {
            return Err(BinderyError::NoArticles);
        }

        let title = options
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("Bookmark Digest - {}", Local::now().format("%B %-d, %Y")));
        let author =
            options.author.filter(|a| !a.trim().is_empty()).unwrap_or_else(|| DEFAULT_AUTHOR.to_string());

        let mut chapters = Vec::with_capacity(articles.len());
        let mut resources = Vec::new();
        let mut seen_hrefs = HashSet::new();
        for (index, article) in articles.iter().enumerate() {
            let (chapter, images) = self.render_chapter(article, index + 1)?;
            chapters.push(chapter);
            for resource in images {
                if seen_hrefs.insert(resource.href.clone()) {
                    resources.push(resource);
                }
            }
        }

        // A cover is cosmetic; its failure never sinks the export.
        let synthesizer = CoverSynthesizer::new(&self.export_dir);
        match synthesizer.synthesize(&CoverOptions {
            title: title.clone(),
            article_count: articles.len() as u32,
            author: author.clone(),
            background: options.cover_background,
        }) {
            // The synthesized file stays next to the exported EPUB.
            Ok(cover_path) => match std::fs::read(&cover_path) {
                Ok(data) => {
                    resources.push(Resource {
                        href: "images/cover.png".to_string(),
                        media_type: "image/png".to_string(),
                        data,
                        is_cover: true,
                    });
                }
                Err(e) => tracing::warn!(error = %e, "cover read failed, exporting without cover"),
            },
            Err(e) => tracing::warn!(error = %e, "cover synthesis failed, exporting without cover"),
        }

        let now = Utc::now();
        let meta = PackageMeta {
            title: title.clone(),
            author,
            publisher: DEFAULT_AUTHOR.to_string(),
            description: format!(
                "Collection of {} article{} captured with bindery",
                articles.len(),
                if articles.len() == 1 { "" } else { "s" }
            ),
            identifier: format!("bookmark-digest-{}", now.timestamp_millis()),
            language: "en-US".to_string(),
            modified: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            date: now.format("%Y-%m-%d").to_string(),
        };

        std::fs::create_dir_all(&self.export_dir)?;
        let filename = format!("{}-{}.epub", slug(&title), now.format("%Y%m%d-%H%M%S"));
        let final_path = self.export_dir.join(&filename);
        let partial_path = self.export_dir.join(format!("{filename}.part"));

        // Write the whole container to a scratch name, then rename, so
        // a listed export file is always complete.
        let file = std::fs::File::create(&partial_path)?;
        if let Err(e) = write_package(file, &meta, &chapters, &resources) {
            let _ = std::fs::remove_file(&partial_path);
            return Err(e);
        }
        std::fs::rename(&partial_path, &final_path)?;
        let file_size = std::fs::metadata(&final_path)?.len();

        let id = store
            .insert_export(
                title,
                final_path.to_string_lossy().into_owned(),
                articles.len() as u32,
                file_size,
            )
            .await?;
        store.get_export(id).await
    }

    /// Renders one article into a chapter document plus the local
    /// image resources it references.
    fn render_chapter(&self, article: &Article, number: usize) -> Result<(Chapter, Vec<Resource>)> {
        let content = article.content_html.as_deref().unwrap_or("");
        let (content, images) = embed_local_images(content, &self.images_root)?;
        let content = html_to_xhtml(&content)?;

        let mut meta_lines = Vec::new();
        if let Some(author) = &article.author {
            meta_lines.push(format!("By {}", escape_xml(author)));
        }
        if let Some(site) = &article.site_name {
            meta_lines.push(escape_xml(site));
        }
        if let Some(published) = &article.published_at {
            meta_lines.push(published.format("%B %-d, %Y").to_string());
        }
        meta_lines.push(format!("{} min read", article.reading_time_minutes));
        meta_lines.push(escape_xml(&article.canonical_url));

        let title = escape_xml(&article.title);
        let xhtml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <title>{title}</title>
  <link rel="stylesheet" type="text/css" href="style.css" />
</head>
<body>
  <h1>Chapter {number}: {title}</h1>
  <div class="chapter-meta">{}</div>
  {content}
</body>
</html>
"#,
            meta_lines.join(" &#183; "),
        );

        validate_xml(&xhtml).map_err(|e| {
            BinderyError::Epub(format!("chapter {number} ({}) is not well-formed: {e}", article.id))
        })?;

        Ok((Chapter { href: format!("chapter-{number}.xhtml"), title: article.title.clone(), xhtml }, images))
    }
}

/// Rewrites stored `/images/...` references to package-relative paths
/// and collects the file contents. Images whose files cannot be read
/// are dropped from the chapter.
fn embed_local_images(fragment: &str, images_root: &Path) -> Result<(String, Vec<Resource>)> {
    let mut resources = Vec::new();
    let rewritten = rewrite_str(
        fragment,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img[src]", |el| {
                let src = el.get_attribute("src").unwrap_or_default();
                let Some(relative) = src.strip_prefix("/images/") else {
                    return Ok(());
                };
                match std::fs::read(images_root.join(relative)) {
                    Ok(data) => {
                        let href = format!("images/{relative}");
                        el.set_attribute("src", &href)?;
                        let media_type = media_type_for(&href).to_string();
                        resources.push(Resource { href, media_type, data, is_cover: false });
                    }
                    Err(e) => {
                        tracing::warn!(src, error = %e, "dropping unreadable image from chapter");
                        el.remove();
                    }
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| BinderyError::HtmlParse(e.to_string()))?;
    Ok((rewritten, resources))
}

fn media_type_for(href: &str) -> &'static str {
    match href.rsplit('.').next() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Streams the document through an XML parser to confirm it is
/// well-formed before packaging.
fn validate_xml(document: &str) -> std::result::Result<(), quick_xml::Error> {
    let mut reader = quick_xml::Reader::from_str(document);
    loop {
        match reader.read_event()? {
            quick_xml::events::Event::Eof => return Ok(()),
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_for() {
        assert_eq!(media_type_for("images/x/a.png"), "image/png");
        assert_eq!(media_type_for("images/x/a.jpg"), "image/jpeg");
        assert_eq!(media_type_for("images/x/a"), "image/jpeg");
    }

    #[test]
    fn test_validate_xml_accepts_wellformed() {
        assert!(validate_xml("<html><body><p>ok &amp; fine</p><br /></body></html>").is_ok());
    }

    #[test]
    fn test_validate_xml_rejects_unclosed() {
        assert!(validate_xml("<html><body><p>bad</body></html>").is_err());
    }

    #[test]
    fn test_embed_missing_image_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let fragment = r#"<p>text</p><img src="/images/post/missing.jpg">"#;
        let (out, resources) = embed_local_images(fragment, dir.path()).unwrap();
        assert!(!out.contains("<img"));
        assert!(resources.is_empty());
    }

    #[test]
    fn test_embed_existing_image_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("post")).unwrap();
        std::fs::write(dir.path().join("post/a.jpg"), b"jpegdata").unwrap();
        let fragment = r#"<img src="/images/post/a.jpg" alt="x">"#;
        let (out, resources) = embed_local_images(fragment, dir.path()).unwrap();
        assert!(out.contains(r#"src="images/post/a.jpg""#));
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].href, "images/post/a.jpg");
        assert_eq!(resources[0].data, b"jpegdata");
    }

    #[test]
    fn test_remote_image_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let fragment = r#"<img src="https://cdn.test/a.jpg">"#;
        let (out, resources) = embed_local_images(fragment, dir.path()).unwrap();
        assert!(out.contains("https://cdn.test/a.jpg"));
        assert!(resources.is_empty());
    }
}
