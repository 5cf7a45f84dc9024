use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::{interval, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::entities::Message;
use crate::queue::backoff::retry_delay;
use crate::queue::message::{SUBJECT_LINKS_SAVED, parse_link_saved};
use crate::queue::repository::MessageRepository;

/// Handler failure, tagged with whether queue redelivery may help.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    transient: bool,
}

impl HandlerError {
    pub fn transient(err: impl std::fmt::Display) -> Self {
        Self {
            message: err.to_string(),
            transient: true,
        }
    }

    pub fn permanent(err: impl std::fmt::Display) -> Self {
        Self {
            message: err.to_string(),
            transient: false,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

/// Consumer of link-saved messages. The subscriber owns payload parsing,
/// deadlines, and acknowledgment; the handler only sees valid link ids.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, link_id: Uuid) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub subject: String,
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub visibility_timeout_secs: i64,
    pub base_backoff_secs: u32,
    pub handler_timeout_secs: u64,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            subject: SUBJECT_LINKS_SAVED.to_string(),
            concurrency: 4,
            poll_interval_ms: 1000,
            visibility_timeout_secs: 300, // 5 minutes
            base_backoff_secs: 30,
            handler_timeout_secs: 60,
        }
    }
}

impl SubscriberConfig {
    /// Defaults overridden by `WORKER_*` environment variables.
    pub fn from_env() -> Self {
        fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(fallback)
        }

        let defaults = Self::default();
        Self {
            subject: defaults.subject,
            concurrency: env_parse("WORKER_CONCURRENCY", defaults.concurrency),
            poll_interval_ms: env_parse("WORKER_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            visibility_timeout_secs: env_parse(
                "WORKER_VISIBILITY_TIMEOUT_SECS",
                defaults.visibility_timeout_secs,
            ),
            base_backoff_secs: env_parse("WORKER_BASE_BACKOFF_SECS", defaults.base_backoff_secs),
            handler_timeout_secs: env_parse(
                "WORKER_JOB_TIMEOUT_SECS",
                defaults.handler_timeout_secs,
            ),
        }
    }
}

/// Competing-consumer subscription over the durable message table. Every
/// replica running a `Subscriber` on the same subject shares the stream;
/// each message is delivered to exactly one of them.
pub struct Subscriber {
    pool: PgPool,
    config: SubscriberConfig,
    consumer_id: Uuid,
    shutdown: CancellationToken,
}

impl Subscriber {
    pub fn new(pool: PgPool, config: SubscriberConfig) -> Self {
        Self {
            pool,
            config,
            consumer_id: Uuid::new_v4(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops polling and drains in-flight messages when
    /// cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Poll for due messages until shutdown, dispatching each to `handler`
    /// under bounded concurrency and a per-message deadline.
    /// `ready` fires once the subscription is registered and polling begins.
    pub async fn run<F>(self, handler: Arc<dyn MessageHandler>, ready: F) -> anyhow::Result<()>
    where
        F: FnOnce() + Send,
    {
        info!(
            consumer_id = %self.consumer_id,
            subject = %self.config.subject,
            concurrency = self.config.concurrency,
            "subscriber starting"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut poll = interval(Duration::from_millis(self.config.poll_interval_ms));

        ready();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = poll.tick() => {
                    // Claim only what free permits can absorb; a message
                    // claimed behind a busy handler would burn its visibility
                    // window waiting for a permit.
                    let batch = semaphore
                        .available_permits()
                        .min(self.config.concurrency);
                    if batch == 0 {
                        continue;
                    }

                    let claimed = MessageRepository::claim_due(
                        &self.pool,
                        &self.config.subject,
                        batch as i64,
                        self.consumer_id,
                        self.config.visibility_timeout_secs,
                    )
                    .await;

                    let messages = match claimed {
                        Ok(messages) => messages,
                        Err(e) => {
                            error!("claim messages: {e}");
                            // Avoid a tight loop while the database is down.
                            sleep(Duration::from_secs(1)).await;
                            continue;
                        }
                    };

                    for message in messages {
                        let Ok(permit) = semaphore.clone().acquire_owned().await else {
                            break;
                        };
                        let pool = self.pool.clone();
                        let handler = handler.clone();
                        let config = self.config.clone();
                        let span = info_span!(
                            "message",
                            id = %message.id,
                            subject = %message.subject,
                            attempt = message.attempts + 1,
                        );

                        tokio::spawn(
                            async move {
                                let _permit = permit;
                                dispatch(pool, handler, config, message).await;
                            }
                            .instrument(span),
                        );
                    }
                }
            }
        }

        info!("shutdown requested, draining in-flight messages");
        let _permits = semaphore
            .acquire_many(self.config.concurrency as u32)
            .await?;
        info!("subscriber stopped");
        Ok(())
    }
}

async fn dispatch(
    pool: PgPool,
    handler: Arc<dyn MessageHandler>,
    config: SubscriberConfig,
    message: Message,
) {
    let link_id = match parse_link_saved(&message.payload) {
        Ok(id) => id,
        Err(err) => {
            warn!("dropping malformed payload: {err}");
            if let Err(e) = MessageRepository::mark_dead(&pool, message.id, &err.to_string()).await
            {
                error!("dead-letter malformed message {}: {e}", message.id);
            }
            return;
        }
    };

    let deadline = Duration::from_secs(config.handler_timeout_secs);
    let outcome = match timeout(deadline, handler.handle(link_id)).await {
        Ok(result) => result,
        Err(_) => Err(HandlerError::transient(format!(
            "deadline of {}s exceeded",
            config.handler_timeout_secs
        ))),
    };

    match outcome {
        Ok(()) => {
            if let Err(e) = MessageRepository::ack(&pool, message.id).await {
                // The visibility timeout will re-deliver; at-least-once holds.
                error!("ack message {}: {e}", message.id);
            }
        }
        Err(err) => {
            let attempt = message.attempts + 1;
            if err.is_transient() && attempt < message.max_attempts {
                let delay = retry_delay(attempt, config.base_backoff_secs);
                let next_run_at = Utc::now() + chrono::Duration::seconds(delay.as_secs() as i64);
                warn!(
                    link_id = %link_id,
                    "handler failed, retrying in {}s ({}/{}): {err}",
                    delay.as_secs(),
                    attempt + 1,
                    message.max_attempts,
                );
                if let Err(e) = MessageRepository::retry_later(
                    &pool,
                    message.id,
                    &err.to_string(),
                    next_run_at,
                    delay.as_secs() as i32,
                )
                .await
                {
                    error!("schedule retry for message {}: {e}", message.id);
                }
            } else {
                warn!(
                    link_id = %link_id,
                    "handler failed permanently after {attempt} attempt(s), dead-lettering: {err}"
                );
                if let Err(e) =
                    MessageRepository::mark_dead(&pool, message.id, &err.to_string()).await
                {
                    error!("dead-letter message {}: {e}", message.id);
                }
            }
        }
    }
}
