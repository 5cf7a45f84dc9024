use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::{error, info};

use keepstack::{
    config::Config,
    extractor::ReadabilityExtractor,
    fetcher::Fetcher,
    health::{self, Readiness},
    ingest::Processor,
    observability::Metrics,
    queue::{Subscriber, SubscriberConfig},
    store::Store,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    // The recorder must be installed before any metric handle is created.
    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("install metrics recorder")?;
    let metrics = Arc::new(Metrics::new());

    let readiness = Arc::new(Readiness::default());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(config.database_url())
        .await
        .context("connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("run migrations")?;
    readiness.mark_db_ready();

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("bind {}", config.bind_addr()))?;
    info!("health/metrics server listening on {}", config.bind_addr());
    let health_app = health::router(readiness.clone(), prometheus);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_app).await {
            error!("health server error: {e}");
        }
    });

    let fetcher = Fetcher::new(config.fetch_timeout())?;
    let store = Store::new(pool.clone());
    let processor = Arc::new(Processor::new(
        fetcher,
        Arc::new(ReadabilityExtractor),
        store,
        metrics,
    ));

    let subscriber = Subscriber::new(pool, SubscriberConfig::from_env());
    let shutdown = subscriber.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("listen for shutdown signal: {e}");
            return;
        }
        info!("shutdown signal received");
        shutdown.cancel();
    });

    let ready = {
        let readiness = readiness.clone();
        move || readiness.mark_queue_ready()
    };
    subscriber.run(processor, ready).await?;

    info!("worker stopped");
    Ok(())
}
