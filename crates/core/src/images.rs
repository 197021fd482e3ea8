//! Concurrent image acquisition and content rewriting.
//!
//! For each `<img>` in an extracted fragment the acquirer downloads the
//! remote file, re-encodes it to a storage format, writes it under the
//! images root, and rewrites the element's `src` to the stored path.
//! Individual image failures are isolated: a failed download leaves the
//! original remote `src` in place and the rest of the batch proceeds.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat};
use lol_html::{RewriteStrSettings, element, rewrite_str};
use url::Url;

use crate::config::Config;
use crate::models::NewImage;
use crate::slug::slug;
use crate::{BinderyError, Result};

/// Attributes probed, in order, for an image's source URL. Lazy-load
/// variants back up `src` because placeholder `src` values are usually
/// `data:` URIs, which the probe skips.
pub const SRC_PROBES: &[&str] = &["src", "data-src", "data-lazy-src", "data-original"];

/// Content types accepted from image responses.
const ACCEPTED_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

const DEFAULT_USER_AGENT: &str =
    concat!("bindery/", env!("CARGO_PKG_VERSION"), " (+https://github.com/stormlightlabs)");

/// Acquirer tuning, derived from [`Config`] in the pipeline.
#[derive(Debug, Clone)]
pub struct AcquirerConfig {
    pub timeout_ms: u64,
    pub max_bytes: u64,
    /// JPEG quality for re-encoded rasters.
    pub quality: u8,
    /// Longest edge after downscaling.
    pub max_edge: u32,
    /// In-flight downloads per article.
    pub concurrency: usize,
    pub images_root: PathBuf,
    pub user_agent: String,
}

impl AcquirerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout_ms: config.image_timeout_ms,
            max_bytes: config.max_image_bytes,
            quality: config.image_quality,
            max_edge: 1200,
            concurrency: 4,
            images_root: config.images_dir.clone(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Downloads, converts, and stores article images.
pub struct ImageAcquirer {
    client: reqwest::Client,
    config: AcquirerConfig,
}

/// One image slot in the fragment: the resolved source URL, or `None`
/// when no usable source attribute was found.
#[derive(Debug)]
struct ImageJob {
    source: Option<String>,
    alt: Option<String>,
}

impl ImageAcquirer {
    pub fn new(config: AcquirerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }

    /// Acquires every image referenced by `fragment` and returns the
    /// rewritten fragment plus records for the stored files.
    ///
    /// `article_title` names the per-article storage directory. The
    /// returned records are in the DOM order of their `<img>` elements.
    pub async fn acquire(
        &self,
        fragment: &str,
        base_url: &Url,
        article_title: &str,
    ) -> Result<(String, Vec<NewImage>)> {
        let jobs = scan_images(fragment, base_url);
        if jobs.iter().all(|j| j.source.is_none()) {
            return Ok((fragment.to_string(), Vec::new()));
        }

        let dir_slug = slug(article_title);
        let article_dir = self.config.images_root.join(&dir_slug);
        tokio::fs::create_dir_all(&article_dir).await?;

        // buffered() yields in submission order, which keeps results
        // aligned with DOM positions.
        let results: Vec<Option<NewImage>> = futures::stream::iter(jobs.iter().enumerate().map(
            |(index, job)| {
                let article_dir = article_dir.clone();
                let dir_slug = dir_slug.clone();
                async move {
                    let source = job.source.as_deref()?;
                    match self.fetch_one(source, job.alt.clone(), index, &article_dir, &dir_slug).await {
                        Ok(record) => Some(record),
                        Err(e) => {
                            tracing::warn!(url = source, error = %e, "image acquisition failed");
                            None
                        }
                    }
                }
            },
        ))
        .buffered(self.config.concurrency.max(1))
        .collect()
        .await;

        let stored: Vec<NewImage> = results.iter().flatten().cloned().collect();
        let rewritten = rewrite_sources(fragment, &results)?;
        Ok((rewritten, stored))
    }

    /// Downloads and stores a single image. Returns the record on
    /// success; every failure mode maps to an error so the caller can
    /// isolate it.
    async fn fetch_one(
        &self,
        source: &str,
        alt: Option<String>,
        index: usize,
        article_dir: &Path,
        dir_slug: &str,
    ) -> Result<NewImage> {
        let response = self.client.get(source).send().await?;
        if !response.status().is_success() {
            return Err(BinderyError::Validation(format!(
                "image fetch returned {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();
        if !ACCEPTED_TYPES.contains(&content_type.as_str()) {
            return Err(BinderyError::Validation(format!(
                "unsupported image content type {content_type:?}"
            )));
        }

        if let Some(len) = response.content_length()
            && len > self.config.max_bytes
        {
            return Err(BinderyError::ImageTooLarge { size: len, cap: self.config.max_bytes });
        }

        let bytes = response.bytes().await?;
        if bytes.len() as u64 > self.config.max_bytes {
            return Err(BinderyError::ImageTooLarge {
                size: bytes.len() as u64,
                cap: self.config.max_bytes,
            });
        }

        let decoded = image::load_from_memory(&bytes)?;
        let decoded = self.bound_dimensions(decoded);
        let (width, height) = decoded.dimensions();

        let (encoded, extension) = self.encode(&decoded)?;
        let filename = format!("image-{index}-{}.{extension}", epoch_millis());
        let path = article_dir.join(&filename);
        tokio::fs::write(&path, &encoded).await?;

        Ok(NewImage {
            original_url: source.to_string(),
            local_path: format!("/images/{dir_slug}/{filename}"),
            alt_text: alt,
            width: Some(width),
            height: Some(height),
            size_bytes: Some(encoded.len() as u64),
        })
    }

    /// Downscales so the longest edge fits `max_edge`. Images already
    /// within bounds pass through untouched.
    fn bound_dimensions(&self, img: DynamicImage) -> DynamicImage {
        let (w, h) = img.dimensions();
        if w <= self.config.max_edge && h <= self.config.max_edge {
            return img;
        }
        img.resize(self.config.max_edge, self.config.max_edge, image::imageops::FilterType::Lanczos3)
    }

    /// Re-encodes for storage: transparent inputs keep PNG, everything
    /// else (WebP and GIF included) becomes baseline JPEG.
    fn encode(&self, img: &DynamicImage) -> Result<(Vec<u8>, &'static str)> {
        let mut buffer = Vec::new();
        if has_transparency(img) {
            img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
            return Ok((buffer, "png"));
        }
        let rgb = img.to_rgb8();
        let mut cursor = Cursor::new(&mut buffer);
        let encoder = JpegEncoder::new_with_quality(&mut cursor, self.config.quality);
        rgb.write_with_encoder(encoder)?;
        Ok((buffer, "jpg"))
    }
}

/// True when any pixel is less than fully opaque. Decoders hand back
/// RGBA buffers even for opaque GIF frames, so the color type alone is
/// not enough.
fn has_transparency(img: &DynamicImage) -> bool {
    if !img.color().has_alpha() {
        return false;
    }
    match img {
        DynamicImage::ImageRgba8(rgba) => rgba.pixels().any(|p| p.0[3] < u8::MAX),
        _ => img.to_rgba8().pixels().any(|p| p.0[3] < u8::MAX),
    }
}

fn epoch_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Resolves each `<img>` in the fragment to a fetchable URL, in DOM
/// order. `data:` URIs and elements with no usable probe yield `None`.
fn scan_images(fragment: &str, base_url: &Url) -> Vec<ImageJob> {
    let doc = crate::parse::Document::parse(fragment);
    let Ok(imgs) = doc.select("img") else { return Vec::new() };

    imgs.iter()
        .map(|img| {
            let source = SRC_PROBES
                .iter()
                .filter_map(|attr| img.attr(attr))
                .map(str::trim)
                .find(|v| !v.is_empty() && !v.starts_with("data:"))
                .and_then(|v| {
                    if let Ok(absolute) = Url::parse(v) {
                        Some(absolute.to_string())
                    } else {
                        base_url.join(v).ok().map(|u| u.to_string())
                    }
                });
            let alt = img.attr("alt").map(|a| a.to_string()).filter(|a| !a.is_empty());
            ImageJob { source, alt }
        })
        .collect()
}

/// Rewrites `src` on each stored image, walking the fragment's `<img>`
/// elements in the same order as the acquisition results.
fn rewrite_sources(fragment: &str, results: &[Option<NewImage>]) -> Result<String> {
    let mut slots = results.iter();
    rewrite_str(
        fragment,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img", move |el| {
                if let Some(Some(record)) = slots.next() {
                    el.set_attribute("src", &record.local_path)?;
                    for probe in SRC_PROBES {
                        if *probe != "src" {
                            el.remove_attribute(probe);
                        }
                    }
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| BinderyError::HtmlParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> NewImage {
        NewImage {
            original_url: "https://cdn.test/a.jpg".to_string(),
            local_path: path.to_string(),
            alt_text: None,
            width: Some(10),
            height: Some(10),
            size_bytes: Some(100),
        }
    }

    #[test]
    fn test_scan_resolves_relative_sources() {
        let base = Url::parse("https://example.com/posts/1").unwrap();
        let jobs = scan_images(
            r#"<p><img src="/a.jpg"><img src="https://cdn.test/b.png"></p>"#,
            &base,
        );
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].source.as_deref(), Some("https://example.com/a.jpg"));
        assert_eq!(jobs[1].source.as_deref(), Some("https://cdn.test/b.png"));
    }

    #[test]
    fn test_scan_falls_through_data_uri_placeholder() {
        let base = Url::parse("https://example.com/").unwrap();
        let jobs = scan_images(
            r#"<img src="data:image/gif;base64,AA" data-src="https://cdn.test/real.jpg">"#,
            &base,
        );
        assert_eq!(jobs[0].source.as_deref(), Some("https://cdn.test/real.jpg"));
    }

    #[test]
    fn test_scan_skips_unusable_sources() {
        let base = Url::parse("https://example.com/").unwrap();
        let jobs = scan_images(r#"<img alt="no source"><img src="   ">"#, &base);
        assert_eq!(jobs.len(), 2);
        assert!(jobs[0].source.is_none());
        assert!(jobs[1].source.is_none());
    }

    #[test]
    fn test_rewrite_replaces_src_in_order() {
        let fragment = r#"<p><img src="https://a.test/1.jpg"><img src="https://a.test/2.jpg"></p>"#;
        let results = vec![Some(record("/images/post/image-0-1.jpg")), None];
        let out = rewrite_sources(fragment, &results).unwrap();
        assert!(out.contains(r#"src="/images/post/image-0-1.jpg""#));
        // Second image failed, original source stays.
        assert!(out.contains(r#"src="https://a.test/2.jpg""#));
    }

    #[test]
    fn test_rewrite_drops_lazy_probe_attributes() {
        let fragment = r#"<img data-src="https://a.test/1.jpg" src="x">"#;
        let results = vec![Some(record("/images/post/image-0-1.jpg"))];
        let out = rewrite_sources(fragment, &results).unwrap();
        assert!(!out.contains("data-src"));
        assert!(out.contains(r#"src="/images/post/image-0-1.jpg""#));
    }

    #[test]
    fn test_encode_jpeg_for_opaque_input() {
        let acquirer = ImageAcquirer::new(AcquirerConfig {
            timeout_ms: 1000,
            max_bytes: 1024 * 1024,
            quality: 85,
            max_edge: 1200,
            concurrency: 4,
            images_root: PathBuf::from("/tmp"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
        .unwrap();
        let img = DynamicImage::new_rgb8(8, 8);
        let (bytes, ext) = acquirer.encode(&img).unwrap();
        assert_eq!(ext, "jpg");
        assert!(!bytes.is_empty());
        // new_rgba8 zero-fills, so every pixel is transparent
        let (_, ext) = acquirer.encode(&DynamicImage::new_rgba8(8, 8)).unwrap();
        assert_eq!(ext, "png");
    }

    #[test]
    fn test_encode_jpeg_for_opaque_rgba_frame() {
        let acquirer = ImageAcquirer::new(AcquirerConfig {
            timeout_ms: 1000,
            max_bytes: 1024 * 1024,
            quality: 85,
            max_edge: 1200,
            concurrency: 4,
            images_root: PathBuf::from("/tmp"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
        .unwrap();
        // GIF frames decode to RGBA even when fully opaque
        let opaque = image::RgbaImage::from_pixel(8, 8, image::Rgba([10, 20, 30, 255]));
        let (_, ext) = acquirer.encode(&DynamicImage::ImageRgba8(opaque)).unwrap();
        assert_eq!(ext, "jpg");
    }

    #[test]
    fn test_bound_dimensions_no_upscale() {
        let acquirer = ImageAcquirer::new(AcquirerConfig {
            timeout_ms: 1000,
            max_bytes: 1024,
            quality: 85,
            max_edge: 1200,
            concurrency: 4,
            images_root: PathBuf::from("/tmp"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
        .unwrap();
        let small = acquirer.bound_dimensions(DynamicImage::new_rgb8(100, 50));
        assert_eq!(small.dimensions(), (100, 50));
        let big = acquirer.bound_dimensions(DynamicImage::new_rgb8(2400, 1200));
        assert_eq!(big.dimensions(), (1200, 600));
    }
}
