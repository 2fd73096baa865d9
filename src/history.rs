//! history.rs — bounded in-memory record of recent collection cycles,
//! backing the /status endpoint.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collect::types::Batch;

/// The /status projection of one completed batch.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub collected_at: DateTime<Utc>,
    pub batch_size: usize,
    pub failed_sources: Vec<String>,
}

#[derive(Debug)]
pub struct CycleHistory {
    inner: Mutex<Vec<CycleSummary>>,
    cap: usize,
}

impl CycleHistory {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::with_capacity(cap.min(10_000))),
            cap: cap.min(10_000),
        }
    }

    pub fn record(&self, batch: &Batch) {
        let entry = CycleSummary {
            collected_at: batch.collected_at,
            batch_size: batch.records.len(),
            failed_sources: batch.failed_sources.iter().cloned().collect(),
        };

        let mut v = self.inner.lock().expect("history mutex poisoned");
        v.push(entry);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    pub fn last(&self) -> Option<CycleSummary> {
        let v = self.inner.lock().expect("history mutex poisoned");
        v.last().cloned()
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<CycleSummary> {
        let v = self.inner.lock().expect("history mutex poisoned");
        let len = v.len();
        let start = len.saturating_sub(n);
        v[start..].to_vec()
    }
}
