// src/collect/sources/prices.rs
use async_trait::async_trait;
use metrics::{counter, histogram};

use crate::collect::normalize::{Coercion, FieldMapping, MappingTable};
use crate::collect::sources::{self, SOURCE_PRICES};
use crate::collect::types::{ErrorKind, RawRecord, Scalar, SourceAdapter, SourceResult};
use crate::config::CollectorConfig;

const BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Spot prices (plus market cap, volume, and 24h change) for a configured
/// coin set, from CoinGecko `/simple/price`.
pub struct CoinGeckoPriceAdapter {
    mode: Mode,
}

enum Mode {
    Http {
        url: String,
        api_key: String,
        client: reqwest::Client,
    },
    Fixture(String),
}

impl CoinGeckoPriceAdapter {
    pub fn from_config(cfg: &CollectorConfig, client: reqwest::Client) -> Self {
        let url = format!(
            "{BASE_URL}/simple/price?ids={}&vs_currencies={}\
             &include_market_cap=true&include_24hr_vol=true&include_24hr_change=true",
            cfg.crypto_ids.join(","),
            cfg.vs_currencies.join(","),
        );
        Self {
            mode: Mode::Http {
                url,
                api_key: cfg.coingecko_api_key.clone(),
                client,
            },
        }
    }

    /// Parse a canned JSON body instead of hitting the network.
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    /// Explode the two-level `{coin: {field: number}}` payload into one raw
    /// record per (coin, numeric field). Non-numeric leaves are skipped;
    /// which fields matter is the mapping table's business, not ours.
    fn parse_body(body: &str) -> Result<Vec<RawRecord>, String> {
        let t0 = std::time::Instant::now();

        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| format!("unparsable payload: {e}"))?;
        let coins = value
            .as_object()
            .ok_or("expected a JSON object keyed by coin id")?;

        let mut out = Vec::new();
        for (coin, quotes) in coins {
            let quotes = quotes
                .as_object()
                .ok_or_else(|| format!("quote block for {coin:?} is not an object"))?;
            for (field, v) in quotes {
                let Some(n) = v.as_f64() else { continue };
                let mut rec = RawRecord::new();
                rec.insert("id".to_string(), Scalar::Text(coin.clone()));
                rec.insert(field.clone(), Scalar::Number(n));
                out.push(rec);
            }
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("collector_parse_ms").record(ms);
        counter!("collector_raw_records_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for CoinGeckoPriceAdapter {
    async fn fetch(&self) -> SourceResult {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http {
                url,
                api_key,
                client,
            } => {
                let headers: Vec<(&str, String)> = if api_key.is_empty() {
                    Vec::new()
                } else {
                    vec![("x-cg-demo-api-key", api_key.clone())]
                };
                match sources::get_text(client, SOURCE_PRICES, url, &headers).await {
                    Ok(b) => b,
                    Err(f) => return SourceResult::Failure(f),
                }
            }
        };

        match Self::parse_body(&body) {
            Ok(records) => SourceResult::success(records),
            Err(reason) => SourceResult::failure(SOURCE_PRICES, ErrorKind::Malformed, reason),
        }
    }

    fn name(&self) -> &str {
        SOURCE_PRICES
    }
}

/// Mapping table for the `/simple/price` payload: per requested quote
/// currency, the spot price plus the market-cap/volume/change companions
/// CoinGecko returns alongside it.
pub fn mapping_table(vs_currencies: &[String]) -> MappingTable {
    let mut fields = Vec::with_capacity(vs_currencies.len() * 4);
    for c in vs_currencies {
        fields.push(FieldMapping::new(c, &format!("price_{c}"), c, Coercion::Number));
        fields.push(FieldMapping::new(
            &format!("{c}_market_cap"),
            &format!("market_cap_{c}"),
            c,
            Coercion::Number,
        ));
        fields.push(FieldMapping::new(
            &format!("{c}_24h_vol"),
            &format!("volume_24h_{c}"),
            c,
            Coercion::Number,
        ));
        fields.push(FieldMapping::new(
            &format!("{c}_24h_change"),
            &format!("change_24h_{c}"),
            "percent",
            Coercion::Number,
        ));
    }
    MappingTable {
        entity_field: "id".to_string(),
        timestamp_field: None,
        fields,
    }
}
