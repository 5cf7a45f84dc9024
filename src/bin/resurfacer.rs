use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

use keepstack::{config::Config, resurfacer::Resurfacer};

// The rebuild is sequential per user; two minutes covers any sane backlog.
const RUN_DEADLINE: Duration = Duration::from_secs(120);

const DEFAULT_LIMIT: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let limit = limit_from_env();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(config.database_url())
        .await
        .context("connect to database")?;

    let resurfacer = Resurfacer::new(pool);
    let written = tokio::time::timeout(RUN_DEADLINE, resurfacer.rebuild(limit))
        .await
        .context("rebuild deadline exceeded")??;

    info!("refreshed {written} recommendations");
    Ok(())
}

/// Per-user row cap from RESURFACER_LIMIT. Zero or negative means unlimited;
/// an unset or unparseable value falls back to the default.
fn limit_from_env() -> usize {
    std::env::var("RESURFACER_LIMIT")
        .ok()
        .and_then(|raw| raw.parse::<i64>().ok())
        .map(|limit| limit.max(0) as usize)
        .unwrap_or(DEFAULT_LIMIT)
}
