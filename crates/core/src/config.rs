//! Runtime configuration for the capture and export pipeline.
//!
//! All knobs can be set through environment variables; unset values
//! fall back to the defaults documented on each field. The data root
//! defaults to the platform data directory.

use std::env;
use std::path::PathBuf;

const MIB: u64 = 1024 * 1024;

/// Pipeline configuration, resolved once at startup and passed by
/// reference to the components that need it.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file (`DB_PATH`).
    pub db_path: PathBuf,
    /// Root directory for rehosted article images (`IMAGES_DIR`).
    pub images_dir: PathBuf,
    /// Output directory for EPUB files and covers (`EPUB_EXPORT_DIR`).
    pub export_dir: PathBuf,
    /// Per-image fetch timeout in milliseconds (`IMAGE_TIMEOUT_MS`, default 10000).
    pub image_timeout_ms: u64,
    /// Maximum accepted image size in bytes (`MAX_IMAGE_SIZE_MB`, default 5 MiB).
    pub max_image_bytes: u64,
    /// JPEG re-encode quality (`IMAGE_QUALITY`, default 85).
    pub image_quality: u8,
    /// Maximum raw HTML input size in bytes (`MAX_HTML_SIZE_MB`, default 10 MiB).
    pub max_html_bytes: usize,
    /// Maximum extracted content length in characters
    /// (`MAX_ARTICLE_CONTENT_CHARS`, default 500000).
    pub max_content_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_root = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("bindery");
        Self::with_data_root(data_root)
    }
}

impl Config {
    /// Builds a config rooted at `data_root`, with the default on-disk
    /// layout: `<root>/bindery.db`, `<root>/images`, `<root>/epub-exports`.
    pub fn with_data_root(data_root: PathBuf) -> Self {
        Self {
            db_path: data_root.join("bindery.db"),
            images_dir: data_root.join("images"),
            export_dir: data_root.join("epub-exports"),
            image_timeout_ms: 10_000,
            max_image_bytes: 5 * MIB,
            image_quality: 85,
            max_html_bytes: (10 * MIB) as usize,
            max_content_chars: 500_000,
        }
    }

    /// Resolves the config from the environment, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = env::var("DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("IMAGES_DIR") {
            config.images_dir = PathBuf::from(path);
        }
        if let Ok(path) = env::var("EPUB_EXPORT_DIR") {
            config.export_dir = PathBuf::from(path);
        }
        if let Some(ms) = parse_env("IMAGE_TIMEOUT_MS") {
            config.image_timeout_ms = ms;
        }
        if let Some(mb) = parse_env::<u64>("MAX_IMAGE_SIZE_MB") {
            config.max_image_bytes = mb * MIB;
        }
        if let Some(quality) = parse_env::<u8>("IMAGE_QUALITY") {
            config.image_quality = quality.clamp(1, 100);
        }
        if let Some(mb) = parse_env::<u64>("MAX_HTML_SIZE_MB") {
            config.max_html_bytes = (mb * MIB) as usize;
        }
        if let Some(chars) = parse_env("MAX_ARTICLE_CONTENT_CHARS") {
            config.max_content_chars = chars;
        }

        config
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
