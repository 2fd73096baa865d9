// src/collect/sources/market_stats.rs
use async_trait::async_trait;
use metrics::{counter, histogram};

use crate::collect::normalize::{Coercion, FieldMapping, MappingTable};
use crate::collect::sources::{self, SOURCE_MARKET_STATS};
use crate::collect::types::{ErrorKind, RawRecord, Scalar, SourceAdapter, SourceResult};
use crate::config::CollectorConfig;

const GLOBAL_URL: &str = "https://api.coingecko.com/api/v3/global";

/// Global market statistics from CoinGecko `/global`: totals, dominance,
/// market counts. Everything hangs off the single `"global"` entity.
pub struct CoinGeckoGlobalAdapter {
    mode: Mode,
}

enum Mode {
    Http {
        api_key: String,
        client: reqwest::Client,
    },
    Fixture(String),
}

impl CoinGeckoGlobalAdapter {
    pub fn from_config(cfg: &CollectorConfig, client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http {
                api_key: cfg.coingecko_api_key.clone(),
                client,
            },
        }
    }

    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    /// One raw record per top-level scalar of `data`, and one per nested
    /// object with its numeric leaves flattened as `parent_child` fields.
    /// The payload's own `updated_at` rides along on every record as the
    /// observation timestamp.
    fn parse_body(body: &str) -> Result<Vec<RawRecord>, String> {
        let t0 = std::time::Instant::now();

        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| format!("unparsable payload: {e}"))?;
        let data = value
            .get("data")
            .and_then(|d| d.as_object())
            .ok_or("missing data object")?;

        let updated_at = data.get("updated_at").and_then(|v| v.as_i64());

        let mut out = Vec::new();
        for (key, v) in data {
            if key == "updated_at" {
                continue;
            }
            match v {
                serde_json::Value::Number(_) => {
                    let Some(n) = v.as_f64() else { continue };
                    let mut rec = base_record(updated_at);
                    rec.insert(key.clone(), Scalar::Number(n));
                    out.push(rec);
                }
                serde_json::Value::Object(inner) => {
                    let mut rec = base_record(updated_at);
                    let base_len = rec.len();
                    for (child, leaf) in inner {
                        if let Some(n) = leaf.as_f64() {
                            rec.insert(format!("{key}_{child}"), Scalar::Number(n));
                        }
                    }
                    // An empty group would normalize to a missing-value error.
                    if rec.len() > base_len {
                        out.push(rec);
                    }
                }
                _ => {}
            }
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("collector_parse_ms").record(ms);
        counter!("collector_raw_records_total").increment(out.len() as u64);
        Ok(out)
    }
}

fn base_record(updated_at: Option<i64>) -> RawRecord {
    let mut rec = RawRecord::new();
    rec.insert("id".to_string(), Scalar::Text("global".to_string()));
    if let Some(ts) = updated_at {
        rec.insert("updated_at".to_string(), Scalar::Timestamp(ts));
    }
    rec
}

#[async_trait]
impl SourceAdapter for CoinGeckoGlobalAdapter {
    async fn fetch(&self) -> SourceResult {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http { api_key, client } => {
                let headers: Vec<(&str, String)> = if api_key.is_empty() {
                    Vec::new()
                } else {
                    vec![("x-cg-demo-api-key", api_key.clone())]
                };
                match sources::get_text(client, SOURCE_MARKET_STATS, GLOBAL_URL, &headers).await {
                    Ok(b) => b,
                    Err(f) => return SourceResult::Failure(f),
                }
            }
        };

        match Self::parse_body(&body) {
            Ok(records) => SourceResult::success(records),
            Err(reason) => SourceResult::failure(SOURCE_MARKET_STATS, ErrorKind::Malformed, reason),
        }
    }

    fn name(&self) -> &str {
        SOURCE_MARKET_STATS
    }
}

pub fn mapping_table() -> MappingTable {
    MappingTable {
        entity_field: "id".to_string(),
        timestamp_field: Some("updated_at".to_string()),
        fields: vec![
            FieldMapping::new("total_market_cap_usd", "total_market_cap_usd", "usd", Coercion::Number),
            FieldMapping::new("total_volume_usd", "total_volume_24h_usd", "usd", Coercion::Number),
            FieldMapping::new("market_cap_percentage_btc", "btc_dominance", "percent", Coercion::Number),
            FieldMapping::new(
                "market_cap_change_percentage_24h_usd",
                "market_cap_change_24h",
                "percent",
                Coercion::Number,
            ),
            FieldMapping::new("active_cryptocurrencies", "active_cryptocurrencies", "count", Coercion::Number),
            FieldMapping::new("markets", "markets", "count", Coercion::Number),
            FieldMapping::new("upcoming_icos", "upcoming_icos", "count", Coercion::Number),
            FieldMapping::new("ongoing_icos", "ongoing_icos", "count", Coercion::Number),
            FieldMapping::new("ended_icos", "ended_icos", "count", Coercion::Number),
        ],
    }
}
