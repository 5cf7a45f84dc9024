use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::Message;

/// SQL access for the durable message queue. Claiming uses
/// `FOR UPDATE SKIP LOCKED`, so any number of worker replicas can share one
/// subject without double-delivery; expired visibility windows put crashed
/// consumers' messages back into rotation.
pub struct MessageRepository;

impl MessageRepository {
    /// Publish a message on a subject. Used by the (external) API side and
    /// by tests; the worker only consumes.
    pub async fn publish(
        pool: &PgPool,
        subject: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO messages (subject, payload)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(subject)
        .bind(payload)
        .fetch_one(pool)
        .await
    }

    /// Claim up to `limit` due messages for this consumer, marking them
    /// running until `visibility_timeout_secs` from now.
    pub async fn claim_due(
        pool: &PgPool,
        subject: &str,
        limit: i64,
        consumer_id: Uuid,
        visibility_timeout_secs: i64,
    ) -> Result<Vec<Message>, sqlx::Error> {
        let visibility_till = Utc::now() + chrono::Duration::seconds(visibility_timeout_secs);

        sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages
            SET status = 'running'::message_status,
                visibility_till = $4,
                reserved_by = $3,
                updated_at = now()
            WHERE id IN (
                SELECT id
                FROM messages
                WHERE subject = $1
                  AND (status = 'queued'::message_status OR
                      (status = 'running'::message_status AND visibility_till < now()))
                  AND run_at <= now()
                ORDER BY run_at
                FOR UPDATE SKIP LOCKED
                LIMIT $2
            )
            RETURNING id, subject, payload, run_at, attempts, max_attempts,
                      backoff_seconds, status, last_error, visibility_till,
                      reserved_by, created_at, updated_at
            "#,
        )
        .bind(subject)
        .bind(limit)
        .bind(consumer_id)
        .bind(visibility_till)
        .fetch_all(pool)
        .await
    }

    /// Acknowledge a message after its handler succeeded.
    pub async fn ack(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = 'acked'::message_status,
                visibility_till = NULL,
                reserved_by = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Schedule a redelivery after a transient handler failure.
    pub async fn retry_later(
        pool: &PgPool,
        id: Uuid,
        error: &str,
        next_run_at: DateTime<Utc>,
        backoff_seconds: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = 'queued'::message_status,
                attempts = attempts + 1,
                last_error = $2,
                run_at = $3,
                backoff_seconds = $4,
                visibility_till = NULL,
                reserved_by = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(next_run_at)
        .bind(backoff_seconds)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Dead-letter a message: permanent failure, exhausted retries, or a
    /// payload that could not be parsed.
    pub async fn mark_dead(pool: &PgPool, id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = 'dead'::message_status,
                attempts = attempts + 1,
                last_error = $2,
                visibility_till = NULL,
                reserved_by = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
