//! Crypto-News Collector — binary entrypoint.
//! Boots the scheduler loop plus a small Axum server exposing health,
//! status, and Prometheus metrics.

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crypto_news_aggregator::api::{self, AppState};
use crypto_news_aggregator::collect::retry::RetryPolicy;
use crypto_news_aggregator::collect::scheduler::Scheduler;
use crypto_news_aggregator::collect::sink::JsonlSink;
use crypto_news_aggregator::collect::{sources, Pipeline};
use crypto_news_aggregator::config::CollectorConfig;
use crypto_news_aggregator::history::CycleHistory;
use crypto_news_aggregator::metrics::Metrics;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,collector=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    // Invalid configuration is the one startup fault that halts the process.
    let cfg = CollectorConfig::from_env().context("loading collector configuration")?;
    tracing::info!(
        interval_secs = cfg.update_interval.as_secs(),
        sources = ?cfg.enabled_sources,
        "collector starting"
    );

    let metrics = Metrics::init(cfg.update_interval.as_secs());

    let (adapters, normalizer) = sources::build_registry(&cfg)?;
    let retry = RetryPolicy {
        max_attempts: cfg.max_retries,
        base_delay: cfg.retry_delay,
        backoff_multiplier: cfg.backoff_multiplier,
    };
    let history = Arc::new(CycleHistory::with_capacity(256));
    let sink = Arc::new(JsonlSink::new(cfg.batch_log_path.clone()));
    let pipeline = Arc::new(
        Pipeline::new(adapters, retry, Arc::new(normalizer), sink)
            .with_history(Arc::clone(&history)),
    );

    let scheduler = Scheduler::start(cfg.update_interval, pipeline);

    let router = api::create_router(AppState { history }).merge(metrics.router());
    let addr = format!("{}:{}", cfg.server_host, cfg.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "http server listening");

    tokio::select! {
        res = axum::serve(listener, router).into_future() => {
            res.context("http server")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }

    scheduler.stop().await;
    Ok(())
}
