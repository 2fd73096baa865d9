// src/config.rs
//! Environment-based configuration, read once at startup and passed into the
//! scheduler and pipeline constructors. No ambient globals.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::collect::sources::KNOWN_SOURCES;

const ENV_SOURCES: &str = "ENABLED_SOURCES";
const ENV_SOURCES_PATH: &str = "SOURCES_CONFIG_PATH";

const DEFAULT_CRYPTO_IDS: [&str; 4] = ["bitcoin", "ethereum", "cardano", "solana"];
const DEFAULT_VS_CURRENCIES: [&str; 3] = ["usd", "eur", "gbp"];
const DEFAULT_NEWS_FEED_URL: &str = "https://feeds.bloomberg.com/crypto";

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Wall-clock period between cycle starts.
    pub update_interval: Duration,
    /// Total fetch attempts per source per cycle, >= 1.
    pub max_retries: u32,
    /// Base backoff delay between attempts.
    pub retry_delay: Duration,
    /// Backoff growth factor, >= 1.0.
    pub backoff_multiplier: f64,
    pub enabled_sources: BTreeSet<String>,
    pub coingecko_api_key: String,
    pub crypto_ids: Vec<String>,
    pub vs_currencies: Vec<String>,
    pub news_feed_url: String,
    pub batch_log_path: PathBuf,
    pub server_host: String,
    pub server_port: u16,
}

impl CollectorConfig {
    /// Load and validate the full configuration from the process
    /// environment. An invalid value here is the one startup fault that is
    /// allowed to halt the process.
    pub fn from_env() -> Result<Self> {
        let update_interval_secs: u64 = env_parse("UPDATE_INTERVAL", 300)?;
        let max_retries: u32 = env_parse("MAX_RETRIES", 3)?;
        let retry_delay_secs: u64 = env_parse("RETRY_DELAY", 5)?;
        let backoff_multiplier: f64 = env_parse("BACKOFF_MULTIPLIER", 2.0)?;

        if update_interval_secs == 0 {
            bail!("UPDATE_INTERVAL must be at least 1 second");
        }
        if max_retries == 0 {
            bail!("MAX_RETRIES must be at least 1");
        }
        if backoff_multiplier < 1.0 {
            bail!("BACKOFF_MULTIPLIER must be >= 1.0, got {backoff_multiplier}");
        }

        let enabled_sources = load_enabled_sources()?;
        for name in &enabled_sources {
            if !KNOWN_SOURCES.contains(&name.as_str()) {
                bail!(
                    "unknown source {name:?} in enabled sources (known: {})",
                    KNOWN_SOURCES.join(", ")
                );
            }
        }
        if enabled_sources.is_empty() {
            bail!("no sources enabled");
        }

        Ok(Self {
            update_interval: Duration::from_secs(update_interval_secs),
            max_retries,
            retry_delay: Duration::from_secs(retry_delay_secs),
            backoff_multiplier,
            enabled_sources,
            coingecko_api_key: env_string("COINGECKO_API_KEY", ""),
            crypto_ids: env_list("CRYPTO_IDS", &DEFAULT_CRYPTO_IDS),
            vs_currencies: env_list("VS_CURRENCIES", &DEFAULT_VS_CURRENCIES),
            news_feed_url: env_string("NEWS_FEED_URL", DEFAULT_NEWS_FEED_URL),
            batch_log_path: PathBuf::from(env_string("BATCH_LOG_PATH", "data/batches.jsonl")),
            server_host: env_string("SERVER_HOST", "0.0.0.0"),
            server_port: env_parse("SERVER_PORT", 5000)?,
        })
    }
}

fn env_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(s) if !s.trim().is_empty() => s
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {key}: {e}")),
        _ => Ok(default),
    }
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(s) if !s.trim().is_empty() => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// Resolve the enabled-source set:
/// 1) $ENABLED_SOURCES (inline, comma-separated)
/// 2) $SOURCES_CONFIG_PATH (TOML or JSON file)
/// 3) config/sources.toml
/// 4) config/sources.json
/// 5) every known source
pub fn load_enabled_sources() -> Result<BTreeSet<String>> {
    if let Ok(inline) = std::env::var(ENV_SOURCES) {
        if !inline.trim().is_empty() {
            return Ok(clean_set(inline.split(',').map(str::to_string)));
        }
    }
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        }
        return Err(anyhow!("SOURCES_CONFIG_PATH points to non-existent path"));
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(KNOWN_SOURCES.iter().map(|s| s.to_string()).collect())
}

/// Load the source list from an explicit path. Supports TOML or JSON.
pub fn load_sources_from(path: &Path) -> Result<BTreeSet<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<BTreeSet<String>> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains("sources");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    // Try JSON array
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    // Fallback: also try TOML if not attempted
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported sources format"))
}

fn parse_toml(s: &str) -> Result<BTreeSet<String>> {
    #[derive(serde::Deserialize)]
    struct TomlSources {
        sources: Vec<String>,
    }
    let v: TomlSources = toml::from_str(s)?;
    Ok(clean_set(v.sources.into_iter()))
}

fn parse_json(s: &str) -> Result<BTreeSet<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_set(v.into_iter()))
}

fn clean_set(items: impl Iterator<Item = String>) -> BTreeSet<String> {
    items
        .map(|it| it.trim().to_string())
        .filter(|it| !it.is_empty())
        .collect()
}
