// src/collect/sources/news_rss.rs
use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::collect::normalize::{Coercion, FieldMapping, MappingTable};
use crate::collect::sources::{self, SOURCE_NEWS};
use crate::collect::types::{ErrorKind, RawRecord, Scalar, SourceAdapter, SourceResult};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item")]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822_to_unix(ts: &str) -> i64 {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .unwrap_or(0)
}

/// Crypto-news headlines from an RSS feed. One raw record per item.
pub struct NewsRssAdapter {
    mode: Mode,
}

enum Mode {
    Http {
        url: String,
        client: reqwest::Client,
    },
    Fixture(String),
}

impl NewsRssAdapter {
    pub fn from_url(url: &str, client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        }
    }

    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    fn parse_items(xml: &str) -> Result<Vec<RawRecord>, String> {
        let t0 = std::time::Instant::now();

        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).map_err(|e| format!("parsing rss xml: {e}"))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let text_raw = format!(
                "{}. {}",
                it.title.as_deref().unwrap_or_default(),
                it.description.as_deref().unwrap_or_default()
            );
            let headline = normalize_headline(&text_raw);
            if headline.is_empty() {
                continue;
            }

            // The link is the stable identity for a feed item; headline text
            // is the fallback when a feed omits it.
            let entity = it.link.clone().unwrap_or_else(|| headline.clone());

            let mut rec = RawRecord::new();
            rec.insert("id".to_string(), Scalar::Text(entity));
            rec.insert("headline".to_string(), Scalar::Text(headline));
            rec.insert(
                "published_at".to_string(),
                Scalar::Timestamp(
                    it.pub_date
                        .as_deref()
                        .map(parse_rfc2822_to_unix)
                        .unwrap_or(0),
                ),
            );
            if let Some(link) = it.link {
                rec.insert("link".to_string(), Scalar::Text(link));
            }
            out.push(rec);
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("collector_parse_ms").record(ms);
        counter!("collector_raw_records_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for NewsRssAdapter {
    async fn fetch(&self) -> SourceResult {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http { url, client } => {
                match sources::get_text(client, SOURCE_NEWS, url, &[]).await {
                    Ok(b) => b,
                    Err(f) => return SourceResult::Failure(f),
                }
            }
        };

        match Self::parse_items(&body) {
            Ok(records) => SourceResult::success(records),
            Err(reason) => SourceResult::failure(SOURCE_NEWS, ErrorKind::Malformed, reason),
        }
    }

    fn name(&self) -> &str {
        SOURCE_NEWS
    }
}

pub fn mapping_table() -> MappingTable {
    MappingTable {
        entity_field: "id".to_string(),
        timestamp_field: Some("published_at".to_string()),
        fields: vec![FieldMapping::new("headline", "headline", "text", Coercion::Text)],
    }
}

/// Normalize headline text: decode entities, strip tags, collapse
/// whitespace, trim trailing punctuation, cap length.
pub fn normalize_headline(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Strip trailing sentence punctuation (keep quotes)
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    // 6) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
