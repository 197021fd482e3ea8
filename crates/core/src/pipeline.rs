//! End-to-end ingestion: extraction, image acquisition, persistence.

use url::Url;

use crate::config::Config;
use crate::extract::{ExtractOptions, ExtractionOutcome, extract};
use crate::images::{AcquirerConfig, ImageAcquirer};
use crate::models::{NewArticle, NewImage};
use crate::store::Store;
use crate::Result;

/// Outcome of one ingestion, with the stored article id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { id: i64, image_count: usize },
    Failed { id: i64, error: String },
}

/// Drives captured HTML through extraction and into the store.
pub struct Ingestor<'a> {
    store: &'a Store,
    config: &'a Config,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a Store, config: &'a Config) -> Self {
        Self { store, config }
    }

    /// Ingests one captured page. Extraction failures are persisted as
    /// failed captures and reported in the outcome; structural errors
    /// (oversize input, invalid URL) propagate.
    pub async fn ingest(
        &self,
        raw_html: &str,
        url: &str,
        preserve_images: bool,
    ) -> Result<IngestOutcome> {
        let options = ExtractOptions::from_config(self.config, preserve_images);
        let outcome = extract(raw_html, url, &options)?;

        let extracted = match outcome {
            ExtractionOutcome::Extracted(article) => article,
            ExtractionOutcome::Failed { title, error, original_html } => {
                tracing::info!(url, error, "capture failed, recording for inspection");
                let id = self
                    .store
                    .record_failure(url.to_string(), error.clone(), title, Some(original_html))
                    .await?;
                return Ok(IngestOutcome::Failed { id, error });
            }
        };

        let (content_html, images) = if preserve_images && !extracted.images.is_empty() {
            self.acquire_images(&extracted.content_html, url, &extracted.title).await?
        } else {
            (extracted.content_html.clone(), Vec::new())
        };

        let article = NewArticle {
            canonical_url: url.to_string(),
            original_url: url.to_string(),
            title: extracted.title,
            content_html,
            content_text: extracted.content_text,
            excerpt: extracted.excerpt,
            author: extracted.author,
            site_name: extracted.site_name,
            published_at: extracted.published_at,
            language: extracted.language,
            word_count: extracted.word_count,
            reading_time_minutes: extracted.reading_time_minutes,
        };

        let image_count = images.len();
        let id = self.store.upsert_article(article, images).await?;
        tracing::info!(url, id, image_count, "article stored");
        Ok(IngestOutcome::Stored { id, image_count })
    }

    async fn acquire_images(
        &self,
        content_html: &str,
        url: &str,
        title: &str,
    ) -> Result<(String, Vec<NewImage>)> {
        // The URL already parsed during extraction.
        let base = Url::parse(url).map_err(|e| crate::BinderyError::InvalidUrl(e.to_string()))?;
        let acquirer = ImageAcquirer::new(AcquirerConfig::from_config(self.config))?;
        acquirer.acquire(content_html, &base, title).await
    }
}
