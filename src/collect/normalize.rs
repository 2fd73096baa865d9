// src/collect/normalize.rs
use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use crate::collect::types::{CanonicalRecord, RawRecord, Scalar};

/// How a raw field value is coerced into the canonical value slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Number,
    Text,
    Timestamp,
}

/// One declared raw-field -> canonical-metric mapping.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub raw_field: String,
    pub metric_name: String,
    pub unit: String,
    pub coerce: Coercion,
}

impl FieldMapping {
    pub fn new(raw_field: &str, metric_name: &str, unit: &str, coerce: Coercion) -> Self {
        Self {
            raw_field: raw_field.to_string(),
            metric_name: metric_name.to_string(),
            unit: unit.to_string(),
            coerce,
        }
    }
}

/// Declared mapping from one source's raw shape to the canonical schema.
///
/// Field mappings are ordered: the first one whose raw field is present on a
/// record supplies the metric, and every other field on that record is
/// dropped. Records with no entity and no mapped value field are rejected.
#[derive(Debug, Clone)]
pub struct MappingTable {
    pub entity_field: String,
    /// Raw field carrying the observation timestamp. When absent (or missing
    /// on a record) the fetch timestamp is used instead.
    pub timestamp_field: Option<String>,
    pub fields: Vec<FieldMapping>,
}

#[derive(Debug, Clone, Error)]
#[error("cannot normalize record from {source_name}: {reason}")]
pub struct NormalizationError {
    pub source_name: String,
    pub reason: String,
    pub raw_record: RawRecord,
}

impl NormalizationError {
    fn new(source_name: &str, reason: impl Into<String>, record: &RawRecord) -> Self {
        Self {
            source_name: source_name.to_string(),
            reason: reason.into(),
            raw_record: record.clone(),
        }
    }
}

/// Converts heterogeneous raw payloads into canonical records, driven by the
/// per-source mapping tables declared at registry build time. Holds no
/// mutable state; normalizing the same record twice yields identical output.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    tables: BTreeMap<String, MappingTable>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, source_name: &str, table: MappingTable) -> Self {
        self.tables.insert(source_name.to_string(), table);
        self
    }

    pub fn table_for(&self, source_name: &str) -> Option<&MappingTable> {
        self.tables.get(source_name)
    }

    /// Normalize one raw record. `fetched_at` is the fallback observation
    /// time for sources whose payload carries no timestamp of its own.
    pub fn normalize(
        &self,
        source_name: &str,
        record: &RawRecord,
        fetched_at: DateTime<Utc>,
    ) -> Result<CanonicalRecord, NormalizationError> {
        let table = self.tables.get(source_name).ok_or_else(|| {
            NormalizationError::new(source_name, "no mapping table declared for source", record)
        })?;

        let entity_id = match record.get(&table.entity_field) {
            Some(Scalar::Text(s)) if !s.trim().is_empty() => s.clone(),
            Some(Scalar::Number(n)) => format!("{n}"),
            Some(Scalar::Timestamp(t)) => t.to_string(),
            _ => {
                return Err(NormalizationError::new(
                    source_name,
                    format!("missing entity field {:?}", table.entity_field),
                    record,
                ))
            }
        };

        // First declared mapping present on the record wins; the rest of the
        // record's fields are dropped, not errored.
        let (mapping, raw_value) = table
            .fields
            .iter()
            .find_map(|m| record.get(&m.raw_field).map(|v| (m, v)))
            .ok_or_else(|| {
                NormalizationError::new(source_name, "no mapped value field present", record)
            })?;

        let value = coerce(raw_value, mapping.coerce)
            .map_err(|reason| NormalizationError::new(source_name, reason, record))?;

        let observed_at = table
            .timestamp_field
            .as_deref()
            .and_then(|f| record.get(f))
            .and_then(scalar_to_datetime)
            .unwrap_or(fetched_at);

        Ok(CanonicalRecord {
            entity_id,
            metric_name: mapping.metric_name.clone(),
            value,
            unit: mapping.unit.clone(),
            observed_at,
            source_name: source_name.to_string(),
        })
    }
}

fn coerce(value: &Scalar, rule: Coercion) -> Result<Scalar, String> {
    match rule {
        Coercion::Number => match value {
            Scalar::Number(_) => Ok(value.clone()),
            Scalar::Timestamp(t) => Ok(Scalar::Number(*t as f64)),
            Scalar::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Scalar::Number)
                .map_err(|_| format!("field is not numeric: {s:?}")),
        },
        Coercion::Text => Ok(Scalar::Text(match value {
            Scalar::Text(s) => s.clone(),
            Scalar::Number(n) => format!("{n}"),
            Scalar::Timestamp(t) => t.to_string(),
        })),
        Coercion::Timestamp => match value {
            Scalar::Timestamp(_) => Ok(value.clone()),
            Scalar::Number(n) => Ok(Scalar::Timestamp(*n as i64)),
            Scalar::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Scalar::Timestamp)
                .map_err(|_| format!("field is not a unix timestamp: {s:?}")),
        },
    }
}

fn scalar_to_datetime(value: &Scalar) -> Option<DateTime<Utc>> {
    let secs = match value {
        Scalar::Timestamp(t) => *t,
        Scalar::Number(n) => *n as i64,
        Scalar::Text(_) => return None,
    };
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MappingTable {
        MappingTable {
            entity_field: "id".to_string(),
            timestamp_field: None,
            fields: vec![
                FieldMapping::new("usd", "price_usd", "usd", Coercion::Number),
                FieldMapping::new("usd_market_cap", "market_cap_usd", "usd", Coercion::Number),
            ],
        }
    }

    fn record(pairs: &[(&str, Scalar)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn first_declared_mapping_wins_and_extras_are_dropped() {
        let norm = Normalizer::new().with_table("prices", table());
        let rec = record(&[
            ("id", Scalar::Text("bitcoin".into())),
            ("usd", Scalar::Number(43250.5)),
            ("usd_market_cap", Scalar::Number(8.5e11)),
            ("last_updated_at", Scalar::Number(1_700_000_000.0)),
        ]);
        let out = norm.normalize("prices", &rec, Utc::now()).unwrap();
        assert_eq!(out.metric_name, "price_usd");
        assert_eq!(out.value, Scalar::Number(43250.5));
        assert_eq!(out.entity_id, "bitcoin");
    }

    #[test]
    fn missing_entity_is_an_error() {
        let norm = Normalizer::new().with_table("prices", table());
        let rec = record(&[("usd", Scalar::Number(1.0))]);
        let err = norm.normalize("prices", &rec, Utc::now()).unwrap_err();
        assert!(err.reason.contains("entity"));
        assert_eq!(err.raw_record, rec);
    }

    #[test]
    fn missing_value_is_an_error() {
        let norm = Normalizer::new().with_table("prices", table());
        let rec = record(&[("id", Scalar::Text("bitcoin".into()))]);
        let err = norm.normalize("prices", &rec, Utc::now()).unwrap_err();
        assert!(err.reason.contains("value"));
    }

    #[test]
    fn text_to_number_coercion_parses_or_errors() {
        assert_eq!(
            coerce(&Scalar::Text(" 42.5 ".into()), Coercion::Number),
            Ok(Scalar::Number(42.5))
        );
        assert!(coerce(&Scalar::Text("n/a".into()), Coercion::Number).is_err());
    }

    #[test]
    fn normalize_is_idempotent() {
        let norm = Normalizer::new().with_table("prices", table());
        let rec = record(&[
            ("id", Scalar::Text("ethereum".into())),
            ("usd", Scalar::Number(2280.0)),
        ]);
        let at = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let a = norm.normalize("prices", &rec, at).unwrap();
        let b = norm.normalize("prices", &rec, at).unwrap();
        assert_eq!(a, b);
    }
}
