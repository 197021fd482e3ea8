//! End-to-end pipeline tests: capture, storage, re-ingestion, and
//! EPUB export against a temporary data directory.

use std::io::Read;
use std::path::Path;

use bindery_core::{
    ArticleFilter, ArticlePatch, BinderyError, Config, EpubComposer, ExportOptions, IngestOutcome,
    Ingestor, Page, Store,
};

fn test_config(root: &Path) -> Config {
    Config::with_data_root(root.to_path_buf())
}

async fn open_store(config: &Config) -> Store {
    Store::open(&config.db_path).await.unwrap()
}

fn article_page(title: &str, published: &str, words: usize) -> String {
    format!(
        r#"<html lang="en">
<head>
  <title>{title}</title>
  <meta property="og:site_name" content="Example Journal">
  <meta name="author" content="Jane Roe">
  <meta property="article:published_time" content="{published}">
</head>
<body>
  <article>
    <h1>{title}</h1>
    <p>{}</p>
  </article>
</body>
</html>"#,
        "lorem ipsum dolor sit amet ".repeat(words / 5)
    )
}

async fn ingest_one(store: &Store, config: &Config, html: &str, url: &str) -> i64 {
    let ingestor = Ingestor::new(store, config);
    match ingestor.ingest(html, url, false).await.unwrap() {
        IngestOutcome::Stored { id, .. } => id,
        IngestOutcome::Failed { error, .. } => panic!("unexpected capture failure: {error}"),
    }
}

#[tokio::test]
async fn ingest_stores_article_with_metadata_and_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = open_store(&config).await;

    let html = article_page("Container Networking", "2026-03-01T08:30:00Z", 600);
    let id = ingest_one(&store, &config, &html, "https://example.com/networking").await;

    let article = store.get_article(id).await.unwrap();
    assert_eq!(article.title, "Container Networking");
    assert_eq!(article.canonical_url, "https://example.com/networking");
    assert_eq!(article.author.as_deref(), Some("Jane Roe"));
    assert_eq!(article.site_name.as_deref(), Some("Example Journal"));
    assert_eq!(article.language, "en");
    assert!(article.capture_success);
    assert!(article.word_count >= 590, "word_count was {}", article.word_count);
    assert_eq!(article.reading_time_minutes, article.word_count.div_ceil(200).max(1));
    assert_eq!(article.published_at.unwrap().to_rfc3339(), "2026-03-01T08:30:00+00:00");
    let content = article.content_html.unwrap();
    assert!(content.contains("lorem ipsum"));
    assert!(!content.contains("<script"));
}

#[tokio::test]
async fn oversize_html_is_rejected_without_a_row() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = open_store(&config).await;
    let ingestor = Ingestor::new(&store, &config);

    let html = format!("<html><body><p>{}</p></body></html>", "x".repeat(11 * 1024 * 1024));
    let err = ingestor.ingest(&html, "https://example.com/big", false).await.unwrap_err();
    assert!(matches!(err, BinderyError::HtmlTooLarge { .. }));

    let (articles, total) = store.list_articles(ArticleFilter::default(), Page::default()).await.unwrap();
    assert!(articles.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn unreadable_page_is_recorded_as_failed_capture() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = open_store(&config).await;
    let ingestor = Ingestor::new(&store, &config);

    let html = "<html><body><script>boot();</script></body></html>";
    let outcome = ingestor.ingest(html, "https://example.com/app", false).await.unwrap();
    let IngestOutcome::Failed { id, error } = outcome else {
        panic!("expected failed capture");
    };
    assert!(!error.is_empty());

    let article = store.get_article(id).await.unwrap();
    assert!(!article.capture_success);
    assert_eq!(article.title, "Failed Capture");
    assert_eq!(article.capture_error.as_deref(), Some(error.as_str()));
    assert!(article.content_html.is_none());
}

#[tokio::test]
async fn reingesting_same_url_updates_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = open_store(&config).await;

    let url = "https://example.com/evolving";
    let first = article_page("Original Title", "2026-01-01T00:00:00Z", 400);
    let id = ingest_one(&store, &config, &first, url).await;
    let before = store.get_article(id).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let second = article_page("Revised Title", "2026-01-02T00:00:00Z", 800);
    let second_id = ingest_one(&store, &config, &second, url).await;

    assert_eq!(second_id, id, "re-ingestion must keep the article id");
    let after = store.get_article(id).await.unwrap();
    assert_eq!(after.title, "Revised Title");
    assert!(after.word_count > before.word_count);
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at > after.created_at);

    let (_, total) = store.list_articles(ArticleFilter::default(), Page::default()).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn failed_then_successful_capture_recovers_the_row() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = open_store(&config).await;
    let ingestor = Ingestor::new(&store, &config);

    let url = "https://example.com/flaky";
    let outcome = ingestor
        .ingest("<html><body><script>x()</script></body></html>", url, false)
        .await
        .unwrap();
    let IngestOutcome::Failed { id, .. } = outcome else { panic!() };

    let html = article_page("Now Readable", "2026-02-01T00:00:00Z", 400);
    let recovered = ingest_one(&store, &config, &html, url).await;
    assert_eq!(recovered, id);

    let article = store.get_article(id).await.unwrap();
    assert!(article.capture_success);
    assert!(article.capture_error.is_none());
    assert_eq!(article.title, "Now Readable");
}

#[tokio::test]
async fn export_orders_chapters_by_publication_date() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = open_store(&config).await;

    let newer = article_page("Newer Piece", "2026-06-15T10:00:00Z", 400);
    let older = article_page("Older Piece", "2026-02-03T10:00:00Z", 400);
    let newer_id = ingest_one(&store, &config, &newer, "https://example.com/newer").await;
    let older_id = ingest_one(&store, &config, &older, "https://example.com/older").await;

    let composer = EpubComposer::new(&config.export_dir, &config.images_dir);
    let export = composer
        .compose(&store, vec![newer_id, older_id], ExportOptions::default())
        .await
        .unwrap();

    assert_eq!(export.article_count, 2);
    assert!(export.file_size > 0);
    assert!(Path::new(&export.file_path).exists());
    assert!(export.file_path.ends_with(".epub"));

    let file = std::fs::File::open(&export.file_path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();

    {
        let mut mimetype = archive.by_index(0).unwrap();
        assert_eq!(mimetype.name(), "mimetype");
        let mut contents = String::new();
        mimetype.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "application/epub+zip");
    }

    let mut chapter_one = String::new();
    archive
        .by_name("OEBPS/chapter-1.xhtml")
        .unwrap()
        .read_to_string(&mut chapter_one)
        .unwrap();
    assert!(chapter_one.contains("Chapter 1: Older Piece"));

    let mut chapter_two = String::new();
    archive
        .by_name("OEBPS/chapter-2.xhtml")
        .unwrap()
        .read_to_string(&mut chapter_two)
        .unwrap();
    assert!(chapter_two.contains("Chapter 2: Newer Piece"));

    let mut opf = String::new();
    archive.by_name("OEBPS/content.opf").unwrap().read_to_string(&mut opf).unwrap();
    let first = opf.find("chapter_1_xhtml").unwrap();
    let second = opf.find("chapter_2_xhtml").unwrap();
    assert!(first < second);

    // The synthesized cover persists next to the EPUB.
    let cover_count = std::fs::read_dir(&config.export_dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.starts_with("cover-") && name.ends_with(".png")
        })
        .count();
    assert_eq!(cover_count, 1);

    let listed = store.list_exports(10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, export.id);
}

#[tokio::test]
async fn export_drops_images_with_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = open_store(&config).await;

    // Stored content references an image whose file is gone from disk.
    let body = format!("<p>{}</p>", "words here ".repeat(300));
    let article = bindery_core::NewArticle {
        canonical_url: "https://example.com/ghost".to_string(),
        original_url: "https://example.com/ghost".to_string(),
        title: "Ghost Image".to_string(),
        content_html: format!(r#"{body}<img src="/images/ghost-image/missing.jpg" alt="gone">"#),
        content_text: "words here".to_string(),
        excerpt: None,
        author: None,
        site_name: None,
        published_at: None,
        language: "en".to_string(),
        word_count: 600,
        reading_time_minutes: 3,
    };
    let images = vec![bindery_core::NewImage {
        original_url: "https://example.com/a.jpg".to_string(),
        local_path: "/images/ghost-image/missing.jpg".to_string(),
        alt_text: Some("gone".to_string()),
        width: Some(100),
        height: Some(100),
        size_bytes: Some(1000),
    }];
    let id = store.upsert_article(article, images).await.unwrap();

    let composer = EpubComposer::new(&config.export_dir, &config.images_dir);
    let export = composer.compose(&store, vec![id], ExportOptions::default()).await.unwrap();

    let file = std::fs::File::open(&export.file_path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut chapter = String::new();
    archive
        .by_name("OEBPS/chapter-1.xhtml")
        .unwrap()
        .read_to_string(&mut chapter)
        .unwrap();
    assert!(!chapter.contains("missing.jpg"));
    assert!(chapter.contains("words here"));
}

#[tokio::test]
async fn export_rejects_empty_and_unknown_id_sets() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = open_store(&config).await;
    let composer = EpubComposer::new(&config.export_dir, &config.images_dir);

    let err = composer.compose(&store, vec![], ExportOptions::default()).await.unwrap_err();
    assert!(matches!(err, BinderyError::Validation(_)));

    let err = composer.compose(&store, vec![0], ExportOptions::default()).await.unwrap_err();
    assert!(matches!(err, BinderyError::Validation(_)));

    let err = composer
        .compose(&store, (1..=101).collect(), ExportOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BinderyError::Validation(_)));

    let err = composer.compose(&store, vec![42], ExportOptions::default()).await.unwrap_err();
    assert!(matches!(err, BinderyError::NoArticles));
}

#[tokio::test]
async fn list_filters_and_paginates() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = open_store(&config).await;

    for i in 0..5 {
        let html = article_page(&format!("Entry {i}"), "2026-04-01T00:00:00Z", 400);
        ingest_one(&store, &config, &html, &format!("https://example.com/{i}")).await;
    }

    let page = Page::new(1, 2).unwrap();
    let (articles, total) = store.list_articles(ArticleFilter::default(), page).await.unwrap();
    assert_eq!(total, 5);
    assert_eq!(articles.len(), 2);

    let filter = ArticleFilter { search: Some("Entry 3".to_string()), ..Default::default() };
    let (matches, total) = store.list_articles(filter, Page::default()).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(matches[0].title, "Entry 3");

    assert!(Page::new(0, 10).is_err());
    assert!(Page::new(1, 0).is_err());
    assert!(Page::new(1, 101).is_err());
    assert!(Page::new(1, 100).is_ok());
}

#[tokio::test]
async fn update_and_delete_article() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = open_store(&config).await;

    let html = article_page("Mutable", "2026-05-01T00:00:00Z", 400);
    let id = ingest_one(&store, &config, &html, "https://example.com/mutable").await;

    store
        .update_article(
            id,
            ArticlePatch { title: None, is_archived: Some(true), is_favorite: Some(true) },
        )
        .await
        .unwrap();
    let article = store.get_article(id).await.unwrap();
    assert!(article.is_archived);
    assert!(article.is_favorite);

    let err = store.update_article(id, ArticlePatch::default()).await.unwrap_err();
    assert!(matches!(err, BinderyError::Validation(_)));

    store.delete_article(id, &config.images_dir).await.unwrap();
    let err = store.get_article(id).await.unwrap_err();
    assert!(matches!(err, BinderyError::NotFound { .. }));

    let err = store.delete_article(id, &config.images_dir).await.unwrap_err();
    assert!(matches!(err, BinderyError::NotFound { .. }));
}

#[tokio::test]
async fn settings_defaults_and_masking() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = open_store(&config).await;

    assert_eq!(store.get_setting("SMTP_PORT".to_string()).await.unwrap().as_deref(), Some("587"));
    assert_eq!(store.get_setting("KINDLE_EMAIL".to_string()).await.unwrap(), None);

    store
        .set_setting("SMTP_PASSWORD".to_string(), "hunter2".to_string())
        .await
        .unwrap();
    assert_eq!(
        store.get_setting("SMTP_PASSWORD".to_string()).await.unwrap().as_deref(),
        Some("hunter2")
    );

    let listed = store.list_settings().await.unwrap();
    let password = listed.iter().find(|s| s.key == "SMTP_PASSWORD").unwrap();
    assert_eq!(password.value, "********");
    let port = listed.iter().find(|s| s.key == "SMTP_PORT").unwrap();
    assert_eq!(port.value, "587");

    let err = store.set_setting("NOT_A_KEY".to_string(), "x".to_string()).await.unwrap_err();
    assert!(matches!(err, BinderyError::Validation(_)));
}
