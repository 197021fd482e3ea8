//! Digest cover synthesis.
//!
//! The cover is a 1200x1600 raster: a background image (caller-supplied
//! or a generated gradient) with a text overlay carrying the digest
//! title, date, article count badge, and author line. The overlay is
//! built as SVG and rasterized, which keeps text layout out of this
//! module.

use std::path::{Path, PathBuf};

use chrono::Utc;
use resvg::{tiny_skia, usvg};

use crate::{BinderyError, Result};

pub const COVER_WIDTH: u32 = 1200;
pub const COVER_HEIGHT: u32 = 1600;

const TITLE_WRAP_COLUMN: usize = 25;
const TITLE_MAX_LINES: usize = 3;
const TITLE_CLIP_CHARS: usize = 50;

/// Inputs for one cover.
#[derive(Debug, Clone)]
pub struct CoverOptions {
    pub title: String,
    pub article_count: u32,
    pub author: String,
    /// Optional background raster; scaled to cover dimensions. When
    /// absent a gradient background is generated.
    pub background: Option<PathBuf>,
}

/// Renders cover images into an output directory.
pub struct CoverSynthesizer {
    output_dir: PathBuf,
}

impl CoverSynthesizer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    /// Renders the cover and returns the path of the written PNG.
    pub fn synthesize(&self, options: &CoverOptions) -> Result<PathBuf> {
        let mut pixmap = self.background_pixmap(options.background.as_deref())?;

        let svg = build_overlay_svg(options, pixmap.width(), pixmap.height());
        let mut usvg_options = usvg::Options::default();
        usvg_options.fontdb_mut().load_system_fonts();
        let tree = usvg::Tree::from_str(&svg, &usvg_options)
            .map_err(|e| BinderyError::Cover(format!("overlay svg: {e}")))?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self
            .output_dir
            .join(format!("cover-{}.png", Utc::now().timestamp_millis()));
        let png = pixmap
            .encode_png()
            .map_err(|e| BinderyError::Cover(format!("png encode: {e}")))?;
        std::fs::write(&path, png)?;
        Ok(path)
    }

    /// Loads the background at its own dimensions, or paints the
    /// default gradient at 1200x1600.
    fn background_pixmap(&self, background: Option<&Path>) -> Result<tiny_skia::Pixmap> {
        if let Some(path) = background {
            match image::open(path) {
                Ok(img) => {
                    let img = img.to_rgba8();
                    let mut pixmap = tiny_skia::Pixmap::new(img.width(), img.height())
                        .ok_or_else(|| {
                            BinderyError::Cover("pixmap allocation failed".to_string())
                        })?;
                    for (pixel, out) in img.pixels().zip(pixmap.pixels_mut()) {
                        let [r, g, b, a] = pixel.0;
                        *out = tiny_skia::ColorU8::from_rgba(r, g, b, a).premultiply();
                    }
                    return Ok(pixmap);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "background unreadable, using generated cover");
                }
            }
        }

        let mut pixmap = tiny_skia::Pixmap::new(COVER_WIDTH, COVER_HEIGHT)
            .ok_or_else(|| BinderyError::Cover("pixmap allocation failed".to_string()))?;
        paint_default_background(&mut pixmap);
        Ok(pixmap)
    }
}

/// Vertical navy-to-slate gradient used when no background image is
/// configured.
fn paint_default_background(pixmap: &mut tiny_skia::Pixmap) {
    let height = pixmap.height();
    let width = pixmap.width() as usize;
    let pixels = pixmap.pixels_mut();
    for y in 0..height {
        let t = y as f32 / height as f32;
        let r = (16.0 + t * 34.0) as u8;
        let g = (24.0 + t * 48.0) as u8;
        let b = (48.0 + t * 74.0) as u8;
        let color = tiny_skia::ColorU8::from_rgba(r, g, b, 255).premultiply();
        for x in 0..width {
            pixels[y as usize * width + x] = color;
        }
    }
}

/// Builds the overlay document. Layout coordinates live in a fixed
/// 1200x1600 viewBox that resvg stretches onto the target pixmap.
/// All interpolated text is escaped.
fn build_overlay_svg(options: &CoverOptions, width: u32, height: u32) -> String {
    let date = Utc::now().format("%B %-d, %Y").to_string();
    let badge = if options.article_count == 1 {
        "1 ARTICLE".to_string()
    } else {
        format!("{} ARTICLES", options.article_count)
    };
    let badge_width = 40 + badge.len() as u32 * 18;
    let title_lines = wrap_title(&options.title);

    let mut svg = String::with_capacity(2048);
    svg.push_str(&format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {COVER_WIDTH} {COVER_HEIGHT}" preserveAspectRatio="none">"##
    ));
    svg.push_str(&format!(
        r##"<text x="80" y="140" font-family="Georgia, serif" font-size="40" fill="#e8e8e8">{}</text>"##,
        escape_svg(&date)
    ));
    svg.push_str(&format!(
        r##"<rect x="{}" y="90" width="{badge_width}" height="76" rx="38" fill="#c9a227"/>"##,
        COVER_WIDTH - 80 - badge_width
    ));
    svg.push_str(&format!(
        r##"<text x="{}" y="142" font-family="Helvetica, Arial, sans-serif" font-size="34" font-weight="bold" fill="#1a1a2e" text-anchor="middle">{}</text>"##,
        COVER_WIDTH - 80 - badge_width / 2,
        escape_svg(&badge)
    ));
    svg.push_str(r##"<rect x="80" y="560" width="360" height="6" fill="#c9a227"/>"##);
    for (i, line) in title_lines.iter().enumerate() {
        svg.push_str(&format!(
            r##"<text x="80" y="{}" font-family="Georgia, serif" font-size="92" font-weight="bold" fill="#ffffff">{}</text>"##,
            700 + i * 120,
            escape_svg(line)
        ));
    }
    let after_title = 700 + title_lines.len().max(1) * 120;
    svg.push_str(&format!(
        r##"<rect x="80" y="{after_title}" width="360" height="6" fill="#c9a227"/>"##
    ));
    svg.push_str(&format!(
        r##"<text x="80" y="{}" font-family="Georgia, serif" font-size="44" font-style="italic" fill="#d0d0d0">{}</text>"##,
        after_title + 90,
        escape_svg(&options.author)
    ));
    svg.push_str(&format!(
        r##"<text x="80" y="{}" font-family="Helvetica, Arial, sans-serif" font-size="36" letter-spacing="6" fill="#9a9ab0">BOOKMARK DIGEST</text>"##,
        COVER_HEIGHT - 100
    ));
    svg.push_str("</svg>");
    svg
}

/// Wraps the title to the cover column width, capping line count. The
/// last line gains an ellipsis when the title was clipped.
fn wrap_title(title: &str) -> Vec<String> {
    let clipped: String = title.chars().take(TITLE_CLIP_CHARS).collect();
    let was_clipped = clipped.len() < title.len();

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in clipped.split_whitespace() {
        let candidate_len = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if candidate_len > TITLE_WRAP_COLUMN && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push("Untitled".to_string());
    }

    let truncated = lines.len() > TITLE_MAX_LINES;
    lines.truncate(TITLE_MAX_LINES);
    if (was_clipped || truncated)
        && let Some(last) = lines.last_mut()
    {
        last.push('\u{2026}');
    }
    lines
}

fn escape_svg(text: &str) -> String {
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
