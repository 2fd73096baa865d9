// src/collect/types.rs
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dynamically-typed scalar carried by raw and canonical records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Text(String),
    Number(f64),
    /// Unix seconds, UTC.
    Timestamp(i64),
}

impl Scalar {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Scalar::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

/// One adapter observation before normalization: field name -> scalar.
/// BTreeMap keeps iteration deterministic.
pub type RawRecord = BTreeMap<String, Scalar>;

/// Failure taxonomy for source fetches. Only `Transient` and `RateLimited`
/// are worth retrying; the other two fail fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    RateLimited,
    Malformed,
    Unauthorized,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::RateLimited)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Unauthorized => "unauthorized",
        }
    }
}

/// A classified fetch failure. Failure is a value here, not an unwound
/// exception; adapters hand this back instead of raising.
#[derive(Debug, Clone, Error)]
#[error("{source_name}: {}: {message}", self.kind.as_str())]
pub struct SourceFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub source_name: String,
    /// Provider-advertised Retry-After, when one was present (429 responses).
    pub retry_after: Option<Duration>,
}

impl SourceFailure {
    pub fn new(source_name: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source_name: source_name.to_string(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// Outcome of one adapter fetch: either a clean set of raw records or a
/// classified failure, never a mix.
#[derive(Debug, Clone)]
pub enum SourceResult {
    Success {
        records: Vec<RawRecord>,
        fetched_at: DateTime<Utc>,
    },
    Failure(SourceFailure),
}

impl SourceResult {
    pub fn success(records: Vec<RawRecord>) -> Self {
        SourceResult::Success {
            records,
            fetched_at: Utc::now(),
        }
    }

    pub fn failure(source_name: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        SourceResult::Failure(SourceFailure::new(source_name, kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SourceResult::Success { .. })
    }
}

/// The unified record shape every source is normalized into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub entity_id: String,
    pub metric_name: String,
    pub value: Scalar,
    pub unit: String,
    pub observed_at: DateTime<Utc>,
    pub source_name: String,
}

/// The atomic unit of output for one collection cycle. `collected_at` is
/// held once at batch level; every record in the batch shares it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub collected_at: DateTime<Utc>,
    pub records: Vec<CanonicalRecord>,
    pub failed_sources: BTreeSet<String>,
}

impl Batch {
    pub fn empty(collected_at: DateTime<Utc>) -> Self {
        Self {
            collected_at,
            records: Vec::new(),
            failed_sources: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One external provider of one named data type.
///
/// Implementations must not retry internally (the retry policy owns that)
/// and must not panic across this boundary; every transport, status, or
/// parse problem becomes a `SourceResult::Failure`.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self) -> SourceResult;
    fn name(&self) -> &str;
}
