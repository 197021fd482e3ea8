//! Error types for bindery operations.
//!
//! This module defines the main error type [`BinderyError`] covering
//! extraction, image acquisition, persistence, cover synthesis, and
//! EPUB assembly.
//!
//! Anticipated negative outcomes that the pipeline records rather than
//! surfaces (a readability miss, a single unfetchable image) are not
//! errors here; they are represented as values by the components that
//! produce them. `BinderyError` is for failures the caller must handle.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for capture and export operations.
#[derive(Error, Debug)]
pub enum BinderyError {
    /// Malformed input rejected at a boundary (pagination, id lists,
    /// unknown update fields).
    #[error("invalid input: {0}")]
    Validation(String),

    /// An addressed entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Raw HTML input exceeded the configured size cap.
    #[error("HTML input is {size} bytes, exceeding the {cap} byte cap")]
    HtmlTooLarge { size: usize, cap: usize },

    /// A fetched image exceeded the configured size cap.
    #[error("image is {size} bytes, exceeding the {cap} byte cap")]
    ImageTooLarge { size: u64, cap: u64 },

    /// Invalid URL provided.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// HTML could not be parsed or rewritten at all.
    #[error("failed to process HTML: {0}")]
    HtmlParse(String),

    /// HTTP request errors from reqwest.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timeout during image acquisition.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Database errors from the store.
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    /// File and directory I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raster decode or encode errors.
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    /// A referenced file is missing or unreadable.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// No article in the selection was exportable.
    #[error("no exportable articles matched the selection")]
    NoArticles,

    /// Cover synthesis failed; callers may treat this as non-fatal.
    #[error("cover synthesis failed: {0}")]
    Cover(String),

    /// EPUB serialization failed; the artifact was not written.
    #[error("EPUB assembly failed: {0}")]
    Epub(String),
}

/// Result type alias for BinderyError.
pub type Result<T> = std::result::Result<T, BinderyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = BinderyError::NotFound { entity: "article", id: 42 };
        assert!(err.to_string().contains("article"));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_html_too_large_display() {
        let err = BinderyError::HtmlTooLarge { size: 11 * 1024 * 1024, cap: 10 * 1024 * 1024 };
        assert!(err.to_string().contains("cap"));
    }

    #[test]
    fn test_validation_display() {
        let err = BinderyError::Validation("limit must be between 1 and 100".to_string());
        assert!(err.to_string().contains("limit"));
    }
}
