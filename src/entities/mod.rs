use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A saved URL owned by a user, with read/favorite state. Created by the
/// external API; the ingestion pipeline only backfills `title` and
/// `source_domain`.
#[derive(Debug, Clone, FromRow)]
pub struct Link {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub source_domain: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub favorite: bool,
}

/// Extracted, sanitized content for a link. One row per link, replaced in
/// full on every successful ingestion.
#[derive(Debug, Clone, FromRow)]
pub struct Archive {
    pub link_id: Uuid,
    pub html: String,
    pub extracted_text: String,
    pub word_count: i32,
    pub lang: Option<String>,
    pub title: Option<String>,
    pub byline: Option<String>,
}

/// A per-link resurfacing score, scoped to a user through the link's owner.
#[derive(Debug, Clone, FromRow)]
pub struct Recommendation {
    pub link_id: Uuid,
    pub score: i32,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a queued message. `acked` is terminal success, `dead` is the
/// dead-letter state after retries are exhausted or the payload is invalid.
#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "message_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Running,
    Acked,
    Dead,
}

/// A durable queue message. Consumers in the same group compete for rows via
/// `FOR UPDATE SKIP LOCKED`; `visibility_till` re-queues messages whose
/// consumer died mid-flight.
#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub subject: String,
    pub payload: serde_json::Value,
    pub run_at: DateTime<Utc>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub backoff_seconds: i32,
    pub status: MessageStatus,
    pub last_error: Option<String>,
    pub visibility_till: Option<DateTime<Utc>>,
    pub reserved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
