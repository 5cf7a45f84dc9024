//! Transactional persistence for ingestion results.

use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::Link;
use crate::extractor::Article;
use crate::ingest::IngestError;

pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch the link row for an ingestion message. A missing row is a
    /// permanent error; the message was either bogus or the link was removed.
    pub async fn lookup_link(&self, id: Uuid) -> Result<Link, IngestError> {
        let link = sqlx::query_as::<_, Link>(
            r#"
            SELECT id, user_id, url, title, source_domain, created_at, read_at, favorite
            FROM links
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(IngestError::Persist)?;

        link.ok_or(IngestError::NotFound(id))
    }

    /// Write the extraction result in one transaction: backfill the link's
    /// title and source domain, then upsert the archive row. Any failure
    /// rolls the whole transaction back, leaving prior archive state intact.
    pub async fn persist(
        &self,
        link: &Link,
        article: &Article,
        raw_body: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if !article.title.is_empty() {
            sqlx::query("UPDATE links SET title = $2 WHERE id = $1")
                .bind(link.id)
                .bind(&article.title)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(domain) = source_domain(&link.url) {
            sqlx::query("UPDATE links SET source_domain = $2 WHERE id = $1")
                .bind(link.id)
                .bind(domain)
                .execute(&mut *tx)
                .await?;
        }

        let html = if article.html.is_empty() {
            raw_body
        } else {
            article.html.as_str()
        };

        sqlx::query(
            r#"
            INSERT INTO archives (link_id, html, extracted_text, word_count, lang, title, byline)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (link_id) DO UPDATE
              SET html           = EXCLUDED.html,
                  extracted_text = EXCLUDED.extracted_text,
                  word_count     = EXCLUDED.word_count,
                  lang           = EXCLUDED.lang,
                  title          = EXCLUDED.title,
                  byline         = EXCLUDED.byline
            "#,
        )
        .bind(link.id)
        .bind(html)
        .bind(&article.text)
        .bind(article.word_count.min(i32::MAX as usize) as i32)
        .bind(article.language.as_deref())
        .bind((!article.title.is_empty()).then_some(article.title.as_str()))
        .bind(article.byline.as_deref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Derive the display domain for a link: lower-cased host with a leading
/// "www." stripped. Returns None for URLs without a host.
pub fn source_domain(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let host = parsed.host_str()?.trim().to_lowercase();
    if host.is_empty() {
        return None;
    }
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}
