// src/collect/sources/mod.rs
pub mod market_stats;
pub mod news_rss;
pub mod prices;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::StatusCode;

use crate::collect::normalize::Normalizer;
use crate::collect::types::{ErrorKind, SourceAdapter, SourceFailure};
use crate::config::CollectorConfig;

pub const SOURCE_PRICES: &str = "coingecko_prices";
pub const SOURCE_MARKET_STATS: &str = "coingecko_global";
pub const SOURCE_NEWS: &str = "crypto_news";

pub const KNOWN_SOURCES: [&str; 3] = [SOURCE_PRICES, SOURCE_MARKET_STATS, SOURCE_NEWS];

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the enabled adapters and the normalizer holding their mapping
/// tables. Iteration over the config set fixes source declaration order for
/// the whole process lifetime.
pub fn build_registry(
    cfg: &CollectorConfig,
) -> Result<(Vec<Arc<dyn SourceAdapter>>, Normalizer)> {
    let client = http_client().context("building http client")?;

    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    let mut normalizer = Normalizer::new();

    for name in &cfg.enabled_sources {
        match name.as_str() {
            SOURCE_PRICES => {
                adapters.push(Arc::new(prices::CoinGeckoPriceAdapter::from_config(
                    cfg,
                    client.clone(),
                )));
                normalizer =
                    normalizer.with_table(SOURCE_PRICES, prices::mapping_table(&cfg.vs_currencies));
            }
            SOURCE_MARKET_STATS => {
                adapters.push(Arc::new(market_stats::CoinGeckoGlobalAdapter::from_config(
                    cfg,
                    client.clone(),
                )));
                normalizer =
                    normalizer.with_table(SOURCE_MARKET_STATS, market_stats::mapping_table());
            }
            SOURCE_NEWS => {
                adapters.push(Arc::new(news_rss::NewsRssAdapter::from_url(
                    &cfg.news_feed_url,
                    client.clone(),
                )));
                normalizer = normalizer.with_table(SOURCE_NEWS, news_rss::mapping_table());
            }
            other => bail!("unknown source in enabled_sources: {other}"),
        }
    }

    Ok((adapters, normalizer))
}

pub(crate) fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("crypto-news-aggregator/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Map an HTTP status to the failure taxonomy.
pub(crate) fn classify_status(status: StatusCode) -> ErrorKind {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ErrorKind::RateLimited
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ErrorKind::Unauthorized
    } else if status.is_server_error() {
        ErrorKind::Transient
    } else {
        ErrorKind::Malformed
    }
}

fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// GET `url` and hand back the body on 2xx; anything else becomes a
/// classified `SourceFailure`.
pub(crate) async fn get_text(
    client: &reqwest::Client,
    source_name: &str,
    url: &str,
    headers: &[(&str, String)],
) -> Result<String, SourceFailure> {
    let mut request = client.get(url);
    for (key, value) in headers {
        request = request.header(*key, value.as_str());
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            return Err(SourceFailure::new(
                source_name,
                ErrorKind::Transient,
                format!("transport: {e}"),
            ))
        }
    };

    let status = response.status();
    if !status.is_success() {
        let retry_after = retry_after_header(response.headers());
        return Err(SourceFailure::new(
            source_name,
            classify_status(status),
            format!("http status {status}"),
        )
        .with_retry_after(retry_after));
    }

    response.text().await.map_err(|e| {
        SourceFailure::new(source_name, ErrorKind::Transient, format!("reading body: {e}"))
    })
}
