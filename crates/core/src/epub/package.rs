//! EPUB 3 container writing.
//!
//! Produces the zip container: stored `mimetype` first, then the
//! container descriptor, package document, navigation document,
//! stylesheet, chapters, and binary resources.

use std::io::{Seek, Write};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::xhtml::escape_xml;
use crate::{BinderyError, Result};

/// Package-level metadata for the OPF document.
#[derive(Debug, Clone)]
pub struct PackageMeta {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub description: String,
    pub identifier: String,
    pub language: String,
    /// RFC 3339 instant for `dcterms:modified`, second precision, UTC.
    pub modified: String,
    pub date: String,
}

/// One spine entry, already rendered to XHTML.
#[derive(Debug, Clone)]
pub struct Chapter {
    pub href: String,
    pub title: String,
    pub xhtml: String,
}

/// A binary asset packaged alongside the chapters.
#[derive(Debug, Clone)]
pub struct Resource {
    pub href: String,
    pub media_type: String,
    pub data: Vec<u8>,
    /// Marks the package cover image.
    pub is_cover: bool,
}

pub const STYLE_CSS: &str = r#"body {
  font-family: Georgia, "Times New Roman", serif;
  line-height: 1.6;
  margin: 0 5%;
}

h1, h2, h3 {
  line-height: 1.25;
  page-break-after: avoid;
}

p {
  text-align: justify;
  hyphens: auto;
  margin: 0 0 0.8em 0;
}

img {
  max-width: 100%;
  height: auto;
  margin: 1em auto;
  display: block;
  page-break-inside: avoid;
}

figure {
  margin: 1em 0;
  page-break-inside: avoid;
}

figcaption {
  font-size: 0.85em;
  font-style: italic;
  text-align: center;
  color: #555555;
}

pre {
  font-family: "Courier New", monospace;
  font-size: 0.85em;
  background-color: #f4f4f4;
  padding: 0.8em;
  overflow-x: auto;
  white-space: pre-wrap;
  page-break-inside: avoid;
}

blockquote {
  margin: 1em 0 1em 1em;
  padding-left: 1em;
  border-left: 3px solid #999999;
  color: #444444;
}

table {
  border-collapse: collapse;
  width: 100%;
  page-break-inside: avoid;
}

th, td {
  border: 1px solid #cccccc;
  padding: 0.4em;
}

.chapter-meta {
  font-size: 0.9em;
  color: #666666;
  margin-bottom: 2em;
}
"#;

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Writes the full EPUB container. The mimetype entry is stored
/// uncompressed and first, as the container format requires.
pub fn write_package<W: Write + Seek>(
    writer: W,
    meta: &PackageMeta,
    chapters: &[Chapter],
    resources: &[Resource],
) -> Result<()> {
    let mut zip = ZipWriter::new(writer);
    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let deflated =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("mimetype", stored).map_err(zip_err)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", deflated).map_err(zip_err)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    zip.start_file("OEBPS/content.opf", deflated).map_err(zip_err)?;
    zip.write_all(generate_opf(meta, chapters, resources).as_bytes())?;

    zip.start_file("OEBPS/nav.xhtml", deflated).map_err(zip_err)?;
    zip.write_all(generate_nav(meta, chapters).as_bytes())?;

    zip.start_file("OEBPS/style.css", deflated).map_err(zip_err)?;
    zip.write_all(STYLE_CSS.as_bytes())?;

    for chapter in chapters {
        zip.start_file(format!("OEBPS/{}", chapter.href), deflated).map_err(zip_err)?;
        zip.write_all(chapter.xhtml.as_bytes())?;
    }

    for resource in resources {
        zip.start_file(format!("OEBPS/{}", resource.href), deflated).map_err(zip_err)?;
        zip.write_all(&resource.data)?;
    }

    zip.finish().map_err(zip_err)?;
    Ok(())
}

fn zip_err(e: zip::result::ZipError) -> BinderyError {
    BinderyError::Epub(e.to_string())
}

fn generate_opf(meta: &PackageMeta, chapters: &[Chapter], resources: &[Resource]) -> String {
    let mut opf = String::new();

    opf.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
"#,
    );
    opf.push_str(&format!(
        "    <dc:identifier id=\"BookId\">{}</dc:identifier>\n",
        escape_xml(&meta.identifier)
    ));
    opf.push_str(&format!("    <dc:title>{}</dc:title>\n", escape_xml(&meta.title)));
    opf.push_str(&format!("    <dc:creator>{}</dc:creator>\n", escape_xml(&meta.author)));
    opf.push_str(&format!("    <dc:language>{}</dc:language>\n", escape_xml(&meta.language)));
    opf.push_str(&format!("    <dc:publisher>{}</dc:publisher>\n", escape_xml(&meta.publisher)));
    opf.push_str(&format!(
        "    <dc:description>{}</dc:description>\n",
        escape_xml(&meta.description)
    ));
    opf.push_str(&format!("    <dc:date>{}</dc:date>\n", escape_xml(&meta.date)));
    opf.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        escape_xml(&meta.modified)
    ));
    if resources.iter().any(|r| r.is_cover) {
        opf.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");
    }

    opf.push_str("  </metadata>\n  <manifest>\n");
    opf.push_str(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
    );
    opf.push_str("    <item id=\"style\" href=\"style.css\" media-type=\"text/css\"/>\n");
    for chapter in chapters {
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            href_to_id(&chapter.href),
            escape_xml(&chapter.href)
        ));
    }
    for resource in resources {
        let id = if resource.is_cover { "cover-image".to_string() } else { href_to_id(&resource.href) };
        let properties = if resource.is_cover { " properties=\"cover-image\"" } else { "" };
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"{}/>\n",
            id,
            escape_xml(&resource.href),
            escape_xml(&resource.media_type),
            properties
        ));
    }

    opf.push_str("  </manifest>\n  <spine>\n");
    for chapter in chapters {
        opf.push_str(&format!("    <itemref idref=\"{}\"/>\n", href_to_id(&chapter.href)));
    }
    opf.push_str("  </spine>\n</package>\n");
    opf
}

fn generate_nav(meta: &PackageMeta, chapters: &[Chapter]) -> String {
    let mut nav = String::new();
    nav.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <title>"#,
    );
    nav.push_str(&escape_xml(&meta.title));
    nav.push_str(
        r#"</title>
  <link rel="stylesheet" type="text/css" href="style.css" />
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>Contents</h1>
    <ol>
"#,
    );
    for chapter in chapters {
        nav.push_str(&format!(
            "      <li><a href=\"{}\">{}</a></li>\n",
            escape_xml(&chapter.href),
            escape_xml(&chapter.title)
        ));
    }
    nav.push_str(
        r#"    </ol>
  </nav>
</body>
</html>
"#,
    );
    nav
}

pub(super) fn href_to_id(href: &str) -> String {
    href.replace(['/', '.', ' ', '-'], "_")
}
