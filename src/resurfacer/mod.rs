//! Recommendation rebuild job.
//!
//! For every user with unread links, recompute a deterministic score per
//! link and atomically replace that user's recommendation rows. Users are
//! processed sequentially in user-id order, one transaction each, so a
//! failure never leaves a user's set half-written and never blocks users
//! that already committed.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

const MAX_AGE_DAYS: i64 = 30;
const FAVORITE_BONUS: i32 = 10;

#[derive(Error, Debug)]
#[error("rebuild aborted at user {user_id} after {completed} rows written: {source}")]
pub struct RebuildError {
    pub user_id: Uuid,
    /// Recommendation rows committed for earlier users; those stay committed.
    pub completed: usize,
    #[source]
    pub source: sqlx::Error,
}

#[derive(Debug, FromRow)]
struct UnreadLink {
    id: Uuid,
    created_at: DateTime<Utc>,
    favorite: bool,
    word_count: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub link_id: Uuid,
    pub score: i32,
    pub created_at: DateTime<Utc>,
}

pub struct Resurfacer {
    pool: PgPool,
    now: fn() -> DateTime<Utc>,
}

impl Resurfacer {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            now: Utc::now,
        }
    }

    /// Override the time source. Intended for tests.
    pub fn with_now(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Rebuild recommendations for every user with unread links, keeping at
    /// most `limit` rows per user (0 means unlimited). Returns the total
    /// rows written.
    #[instrument(skip(self))]
    pub async fn rebuild(&self, limit: usize) -> Result<usize, RebuildError> {
        let user_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT user_id FROM links WHERE read_at IS NULL ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|source| RebuildError {
            user_id: Uuid::nil(),
            completed: 0,
            source,
        })?;

        let mut total = 0;
        for user_id in user_ids {
            match self.rebuild_for_user(user_id, limit).await {
                Ok(written) => total += written,
                Err(source) => {
                    return Err(RebuildError {
                        user_id,
                        completed: total,
                        source,
                    });
                }
            }
        }

        Ok(total)
    }

    async fn rebuild_for_user(&self, user_id: Uuid, limit: usize) -> Result<usize, sqlx::Error> {
        let rows = sqlx::query_as::<_, UnreadLink>(
            r#"
            SELECT l.id, l.created_at, l.favorite,
                   COALESCE(a.word_count, 0) AS word_count
            FROM links l
            LEFT JOIN archives a ON a.link_id = l.id
            WHERE l.user_id = $1 AND l.read_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            // Unread links vanished between listing and loading; drop any
            // stale recommendations and move on.
            self.clear_existing(user_id).await?;
            return Ok(0);
        }

        let now = (self.now)();
        let candidates = rows
            .into_iter()
            .map(|row| Candidate {
                link_id: row.id,
                score: score_link(now, row.created_at, row.favorite, row.word_count),
                created_at: row.created_at,
            })
            .collect();
        let ranked = rank(candidates, limit);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM recommendations r
            USING links l
            WHERE r.link_id = l.id AND l.user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        for candidate in &ranked {
            sqlx::query(
                r#"
                INSERT INTO recommendations (link_id, score, updated_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (link_id) DO UPDATE
                  SET score = EXCLUDED.score, updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(candidate.link_id)
            .bind(candidate.score)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(user_id = %user_id, written = ranked.len(), "rebuilt recommendations");
        Ok(ranked.len())
    }

    async fn clear_existing(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            DELETE FROM recommendations r
            USING links l
            WHERE r.link_id = l.id AND l.user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Deterministic resurfacing score: age in whole days (clamped to 0..=30),
/// plus 10 for favorites, plus a length bonus for longer reads.
pub fn score_link(
    now: DateTime<Utc>,
    created_at: DateTime<Utc>,
    favorite: bool,
    word_count: i32,
) -> i32 {
    let days_unread = (now - created_at).num_days().clamp(0, MAX_AGE_DAYS) as i32;

    let mut score = days_unread;
    if favorite {
        score += FAVORITE_BONUS;
    }
    score += length_bonus(word_count);
    score
}

fn length_bonus(word_count: i32) -> i32 {
    match word_count {
        wc if wc >= 2500 => 3,
        wc if wc >= 1500 => 2,
        wc if wc >= 800 => 1,
        _ => 0,
    }
}

/// Order candidates by descending score, breaking ties by ascending creation
/// time so older unread items win, then by link id so the truncated set is a
/// function of the scored inputs alone, never of fetch order. A `limit` of 0
/// keeps everything.
pub fn rank(mut candidates: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.link_id.cmp(&b.link_id))
    });
    if limit > 0 {
        candidates.truncate(limit);
    }
    candidates
}
