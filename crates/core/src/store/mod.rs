//! SQLite persistence for articles, images, exports, and settings.
//!
//! All access goes through [`Store`], which wraps an async connection
//! and keeps every multi-statement operation inside a transaction.
//! Timestamps are written by this module in RFC 3339 with microsecond
//! precision, so repeated writes within the same second still order.

mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use tokio_rusqlite::Connection;

use crate::models::{
    Article, ArticleFilter, ArticlePatch, Export, ImageRecord, MASKED_VALUE, NewArticle, NewImage,
    Page, RECOGNIZED_SETTING_KEYS, Setting, setting_default, setting_is_secret,
};
use crate::{BinderyError, Result};

/// Raw HTML retained on a failed capture is clipped to this many
/// characters.
const FAILURE_RAW_HTML_CHARS: usize = 10_000;

const ARTICLE_COLUMNS: &str = "id, canonical_url, original_url, title, content_html, content_text, \
     excerpt, author, site_name, published_at, language, word_count, reading_time_minutes, \
     has_images, image_count, capture_success, capture_error, created_at, updated_at, \
     is_archived, is_favorite";

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (creating if needed) the database at `path` and applies
    /// the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(path).await?;
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.execute_batch(schema::SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Inserts a successful capture, or refreshes the existing row
    /// keyed by `canonical_url`. The stored image set is replaced
    /// wholesale and the article's image counters follow it. Returns
    /// the article id, which is stable across re-ingestion.
    pub async fn upsert_article(&self, article: NewArticle, images: Vec<NewImage>) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                let now = now_string();
                let tx = conn.transaction()?;
                tx.execute(
                    r#"INSERT INTO articles (
                           canonical_url, original_url, title, content_html, content_text,
                           excerpt, author, site_name, published_at, language,
                           word_count, reading_time_minutes, has_images, image_count,
                           capture_success, capture_error, raw_html, created_at, updated_at
                       )
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                               ?11, ?12, 0, 0, 1, NULL, NULL, ?13, ?13)
                       ON CONFLICT(canonical_url) DO UPDATE SET
                           original_url = excluded.original_url,
                           title = excluded.title,
                           content_html = excluded.content_html,
                           content_text = excluded.content_text,
                           excerpt = excluded.excerpt,
                           author = excluded.author,
                           site_name = excluded.site_name,
                           published_at = excluded.published_at,
                           language = excluded.language,
                           word_count = excluded.word_count,
                           reading_time_minutes = excluded.reading_time_minutes,
                           capture_success = 1,
                           capture_error = NULL,
                           raw_html = NULL,
                           updated_at = excluded.updated_at"#,
                    params![
                        article.canonical_url,
                        article.original_url,
                        article.title,
                        article.content_html,
                        article.content_text,
                        article.excerpt,
                        article.author,
                        article.site_name,
                        article.published_at.map(|dt| dt.to_rfc3339()),
                        article.language,
                        article.word_count,
                        article.reading_time_minutes,
                        now,
                    ],
                )?;
                // last_insert_rowid is not meaningful on the conflict
                // path, so resolve the id by key.
                let id: i64 = tx.query_row(
                    "SELECT id FROM articles WHERE canonical_url = ?1",
                    params![article.canonical_url],
                    |row| row.get(0),
                )?;

                tx.execute("DELETE FROM images WHERE article_id = ?1", params![id])?;
                for image in &images {
                    tx.execute(
                        r#"INSERT INTO images (article_id, original_url, local_path, alt_text,
                                               width, height, size_bytes, created_at)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                        params![
                            id,
                            image.original_url,
                            image.local_path,
                            image.alt_text,
                            image.width,
                            image.height,
                            image.size_bytes,
                            now,
                        ],
                    )?;
                }
                tx.execute(
                    "UPDATE articles SET has_images = ?1, image_count = ?2 WHERE id = ?3",
                    params![!images.is_empty(), images.len() as i64, id],
                )?;
                tx.commit()?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    /// Records a failed capture so the URL is visible in listings.
    /// The raw input is clipped before storage.
    pub async fn record_failure(
        &self,
        url: String,
        error: String,
        title: Option<String>,
        raw_html: Option<String>,
    ) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                let now = now_string();
                let title = title.unwrap_or_else(|| "Failed Capture".to_string());
                let raw = raw_html.map(|html| clip_chars(&html, FAILURE_RAW_HTML_CHARS));
                conn.execute(
                    r#"INSERT INTO articles (
                           canonical_url, original_url, title, capture_success, capture_error,
                           raw_html, created_at, updated_at
                       )
                       VALUES (?1, ?1, ?2, 0, ?3, ?4, ?5, ?5)
                       ON CONFLICT(canonical_url) DO UPDATE SET
                           title = excluded.title,
                           capture_success = 0,
                           capture_error = excluded.capture_error,
                           raw_html = excluded.raw_html,
                           updated_at = excluded.updated_at"#,
                    params![url, title, error, raw, now],
                )?;
                let id: i64 = conn.query_row(
                    "SELECT id FROM articles WHERE canonical_url = ?1",
                    params![url],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    pub async fn get_article(&self, id: i64) -> Result<Article> {
        let article = self
            .conn
            .call(move |conn| {
                let article = conn
                    .query_row(
                        &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"),
                        params![id],
                        article_from_row,
                    )
                    .optional()?;
                Ok(article)
            })
            .await?;
        article.ok_or(BinderyError::NotFound { entity: "article", id })
    }

    pub async fn get_images(&self, article_id: i64) -> Result<Vec<ImageRecord>> {
        let images = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, article_id, original_url, local_path, alt_text,
                              width, height, size_bytes
                       FROM images WHERE article_id = ?1 ORDER BY id"#,
                )?;
                let images = stmt
                    .query_map(params![article_id], image_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(images)
            })
            .await?;
        Ok(images)
    }

    /// Lists articles matching `filter`, paginated. Returns the page
    /// of rows plus the total match count.
    pub async fn list_articles(
        &self,
        filter: ArticleFilter,
        page: Page,
    ) -> Result<(Vec<Article>, u64)> {
        let result = self
            .conn
            .call(move |conn| {
                let mut clauses: Vec<&str> = Vec::new();
                let mut values: Vec<Box<dyn rusqlite::types::ToSql + Send>> = Vec::new();

                if let Some(search) = &filter.search
                    && !search.trim().is_empty()
                {
                    clauses.push("(title LIKE ? OR content_text LIKE ? OR excerpt LIKE ?)");
                    let pattern = format!("%{}%", search.trim());
                    values.push(Box::new(pattern.clone()));
                    values.push(Box::new(pattern.clone()));
                    values.push(Box::new(pattern));
                }
                if let Some(archived) = filter.is_archived {
                    clauses.push("is_archived = ?");
                    values.push(Box::new(archived));
                }
                if let Some(favorite) = filter.is_favorite {
                    clauses.push("is_favorite = ?");
                    values.push(Box::new(favorite));
                }

                let where_sql = if clauses.is_empty() {
                    String::new()
                } else {
                    format!(" WHERE {}", clauses.join(" AND "))
                };

                let total: u64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM articles{where_sql}"),
                    params_from_iter(values.iter().map(|v| v.as_ref() as &dyn rusqlite::types::ToSql)),
                    |row| row.get::<_, i64>(0),
                )? as u64;

                let sql = format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles{where_sql} ORDER BY {} LIMIT ? OFFSET ?",
                    filter.sort.order_clause(),
                );
                values.push(Box::new(page.limit as i64));
                values.push(Box::new(page.offset() as i64));

                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map(
                        params_from_iter(
                            values.iter().map(|v| v.as_ref() as &dyn rusqlite::types::ToSql),
                        ),
                        article_from_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok((articles, total))
            })
            .await?;
        Ok(result)
    }

    /// Applies a partial update. Empty patches are rejected rather
    /// than silently succeeding.
    pub async fn update_article(&self, id: i64, patch: ArticlePatch) -> Result<()> {
        if patch.is_empty() {
            return Err(BinderyError::Validation("no fields to update".to_string()));
        }
        let updated = self
            .conn
            .call(move |conn| {
                let mut sets: Vec<String> = Vec::new();
                let mut values: Vec<Box<dyn rusqlite::types::ToSql + Send>> = Vec::new();
                if let Some(title) = patch.title {
                    values.push(Box::new(title));
                    sets.push(format!("title = ?{}", values.len()));
                }
                if let Some(archived) = patch.is_archived {
                    values.push(Box::new(archived));
                    sets.push(format!("is_archived = ?{}", values.len()));
                }
                if let Some(favorite) = patch.is_favorite {
                    values.push(Box::new(favorite));
                    sets.push(format!("is_favorite = ?{}", values.len()));
                }
                values.push(Box::new(now_string()));
                sets.push(format!("updated_at = ?{}", values.len()));
                values.push(Box::new(id));
                let sql = format!(
                    "UPDATE articles SET {} WHERE id = ?{}",
                    sets.join(", "),
                    values.len()
                );
                let updated = conn.execute(
                    &sql,
                    params_from_iter(values.iter().map(|v| v.as_ref() as &dyn rusqlite::types::ToSql)),
                )?;
                Ok(updated)
            })
            .await?;
        if updated == 0 {
            return Err(BinderyError::NotFound { entity: "article", id });
        }
        Ok(())
    }

    /// Deletes an article and its image rows. Stored image files are
    /// unlinked best-effort before the row goes away; a missing file
    /// is not an error.
    pub async fn delete_article(&self, id: i64, images_root: &Path) -> Result<()> {
        let images = self.get_images(id).await?;
        for image in &images {
            if let Some(path) = resolve_local_path(images_root, &image.local_path)
                && let Err(e) = tokio::fs::remove_file(&path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %path.display(), error = %e, "failed to unlink image file");
            }
        }
        let deleted = self
            .conn
            .call(move |conn| {
                // ON DELETE CASCADE clears the image rows.
                let deleted = conn.execute("DELETE FROM articles WHERE id = ?1", params![id])?;
                Ok(deleted)
            })
            .await?;
        if deleted == 0 {
            return Err(BinderyError::NotFound { entity: "article", id });
        }
        Ok(())
    }

    /// Fetches successful captures by id in export order: oldest
    /// publication first, ingestion order as tiebreak. Ids without a
    /// successful capture are skipped.
    pub async fn get_exportable_articles(&self, ids: Vec<i64>) -> Result<Vec<Article>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let articles = self
            .conn
            .call(move |conn| {
                let placeholders =
                    (1..=ids.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
                let sql = format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles \
                     WHERE id IN ({placeholders}) AND capture_success = 1 \
                     ORDER BY published_at ASC NULLS LAST, created_at ASC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map(params_from_iter(ids.iter()), article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn insert_export(
        &self,
        name: String,
        file_path: String,
        article_count: u32,
        file_size: u64,
    ) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO exports (name, article_count, file_path, file_size, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5)"#,
                    params![name, article_count, file_path, file_size as i64, now_string()],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get_export(&self, id: i64) -> Result<Export> {
        let export = self
            .conn
            .call(move |conn| {
                let export = conn
                    .query_row(
                        "SELECT id, name, article_count, file_path, file_size, sent_to_kindle, \
                         sent_at, created_at FROM exports WHERE id = ?1",
                        params![id],
                        export_from_row,
                    )
                    .optional()?;
                Ok(export)
            })
            .await?;
        export.ok_or(BinderyError::NotFound { entity: "export", id })
    }

    pub async fn list_exports(&self, limit: u32) -> Result<Vec<Export>> {
        let exports = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, article_count, file_path, file_size, sent_to_kindle, \
                     sent_at, created_at FROM exports ORDER BY created_at DESC LIMIT ?1",
                )?;
                let exports = stmt
                    .query_map(params![limit], export_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(exports)
            })
            .await?;
        Ok(exports)
    }

    /// Deletes an export row and unlinks its file best-effort.
    pub async fn delete_export(&self, id: i64) -> Result<()> {
        let export = self.get_export(id).await?;
        if let Err(e) = tokio::fs::remove_file(&export.file_path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = export.file_path, error = %e, "failed to unlink export file");
        }
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM exports WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn set_export_sent(&self, id: i64) -> Result<()> {
        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE exports SET sent_to_kindle = 1, sent_at = ?1 WHERE id = ?2",
                    params![now_string(), id],
                )?;
                Ok(updated)
            })
            .await?;
        if updated == 0 {
            return Err(BinderyError::NotFound { entity: "export", id });
        }
        Ok(())
    }

    /// Reads a setting, falling back to its built-in default. Unset
    /// keys without defaults yield `None`.
    pub async fn get_setting(&self, key: String) -> Result<Option<String>> {
        let stored = self
            .conn
            .call({
                let key = key.clone();
                move |conn| {
                    let value = conn
                        .query_row(
                            "SELECT value FROM settings WHERE key = ?1",
                            params![key],
                            |row| row.get::<_, String>(0),
                        )
                        .optional()?;
                    Ok(value)
                }
            })
            .await?;
        Ok(stored.or_else(|| setting_default(&key).map(str::to_string)))
    }

    pub async fn set_setting(&self, key: String, value: String) -> Result<()> {
        if !RECOGNIZED_SETTING_KEYS.contains(&key.as_str()) {
            return Err(BinderyError::Validation(format!("unrecognized setting key {key:?}")));
        }
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                       ON CONFLICT(key) DO UPDATE SET
                           value = excluded.value,
                           updated_at = excluded.updated_at"#,
                    params![key, value, now_string()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Lists every recognized setting with its effective value.
    /// Secrets are masked.
    pub async fn list_settings(&self) -> Result<Vec<Setting>> {
        let stored = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT key, value, updated_at FROM settings ORDER BY key")?;
                let settings = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(settings)
            })
            .await?;

        let mut out = Vec::with_capacity(RECOGNIZED_SETTING_KEYS.len());
        for key in RECOGNIZED_SETTING_KEYS {
            let row = stored.iter().find(|(k, _, _)| k == key);
            let (value, updated_at) = match row {
                Some((_, value, updated_at)) => {
                    (value.clone(), parse_datetime(updated_at).unwrap_or_else(Utc::now))
                }
                None => match setting_default(key) {
                    Some(default) => (default.to_string(), Utc::now()),
                    None => continue,
                },
            };
            let value = if setting_is_secret(key) { MASKED_VALUE.to_string() } else { value };
            out.push(Setting { key: (*key).to_string(), value, updated_at });
        }
        Ok(out)
    }
}

/// Microsecond-precision RFC 3339 timestamp. Second precision would
/// make `updated_at > created_at` unobservable on fast re-ingestion.
fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn clip_chars(s: &str, cap: usize) -> String {
    match s.char_indices().nth(cap) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Maps a stored `/images/...` path back to a file under the images
/// root.
fn resolve_local_path(images_root: &Path, local_path: &str) -> Option<PathBuf> {
    let relative = local_path.strip_prefix("/images/")?;
    Some(images_root.join(relative))
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        canonical_url: row.get(1)?,
        original_url: row.get(2)?,
        title: row.get(3)?,
        content_html: row.get(4)?,
        content_text: row.get(5)?,
        excerpt: row.get(6)?,
        author: row.get(7)?,
        site_name: row.get(8)?,
        published_at: row.get::<_, Option<String>>(9)?.and_then(|s| parse_datetime(&s)),
        language: row.get(10)?,
        word_count: row.get(11)?,
        reading_time_minutes: row.get(12)?,
        has_images: row.get::<_, i64>(13)? != 0,
        image_count: row.get(14)?,
        capture_success: row.get::<_, i64>(15)? != 0,
        capture_error: row.get(16)?,
        created_at: parse_datetime(&row.get::<_, String>(17)?).unwrap_or_else(Utc::now),
        updated_at: parse_datetime(&row.get::<_, String>(18)?).unwrap_or_else(Utc::now),
        is_archived: row.get::<_, i64>(19)? != 0,
        is_favorite: row.get::<_, i64>(20)? != 0,
    })
}

fn image_from_row(row: &Row) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: row.get(0)?,
        article_id: row.get(1)?,
        original_url: row.get(2)?,
        local_path: row.get(3)?,
        alt_text: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        size_bytes: row.get(7)?,
    })
}

fn export_from_row(row: &Row) -> rusqlite::Result<Export> {
    Ok(Export {
        id: row.get(0)?,
        name: row.get(1)?,
        article_count: row.get(2)?,
        file_path: row.get(3)?,
        file_size: row.get::<_, i64>(4)? as u64,
        created_at: parse_datetime(&row.get::<_, String>(7)?).unwrap_or_else(Utc::now),
        sent_to_kindle: row.get::<_, i64>(5)? != 0,
        sent_at: row.get::<_, Option<String>>(6)?.and_then(|s| parse_datetime(&s)),
    })
}
