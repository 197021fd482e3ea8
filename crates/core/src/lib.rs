pub mod config;
pub mod cover;
pub mod epub;
pub mod error;
pub mod extract;
pub mod images;
pub mod metadata;
pub mod models;
pub mod parse;
pub mod pipeline;
pub mod sanitize;
pub mod scoring;
pub mod slug;
pub mod store;

pub use config::Config;
pub use cover::{CoverOptions, CoverSynthesizer};
pub use epub::{EpubComposer, ExportOptions, escape_xml, html_to_xhtml};
pub use error::{BinderyError, Result};
pub use extract::{ExtractOptions, ExtractedArticle, ExtractionOutcome, extract};
pub use images::{AcquirerConfig, ImageAcquirer};
pub use metadata::Metadata;
pub use models::{
    Article, ArticleFilter, ArticlePatch, Export, ImageRecord, NewArticle, NewImage, Page, Setting,
    SortKey,
};
pub use parse::Document;
pub use pipeline::{IngestOutcome, Ingestor};
pub use sanitize::sanitize_fragment;
#[doc(hidden)]
pub use scoring::{ScoreConfig, base_tag_score, class_id_weight, link_density, score_element};
pub use slug::slug;
pub use store::Store;
