// src/collect/mod.rs
pub mod normalize;
pub mod retry;
pub mod scheduler;
pub mod sink;
pub mod sources;
pub mod types;

use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use tokio::sync::watch;

use crate::collect::normalize::Normalizer;
use crate::collect::retry::RetryPolicy;
use crate::collect::sink::Sink;
use crate::collect::types::{Batch, CanonicalRecord, SourceAdapter, SourceFailure, SourceResult};
use crate::history::CycleHistory;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collector_cycles_total", "Collection cycles started.");
        describe_counter!(
            "collector_records_total",
            "Canonical records emitted into batches."
        );
        describe_counter!(
            "collector_raw_records_total",
            "Raw records parsed from source payloads."
        );
        describe_counter!(
            "collector_normalize_errors_total",
            "Records dropped by the normalizer."
        );
        describe_counter!(
            "collector_source_errors_total",
            "Sources that exhausted their retry budget in a cycle."
        );
        describe_counter!(
            "collector_retry_attempts_total",
            "Backoff retries performed across all sources."
        );
        describe_counter!("collector_sink_errors_total", "Batches rejected by the sink.");
        describe_histogram!("collector_parse_ms", "Source payload parse time in milliseconds.");
        describe_histogram!(
            "collector_fetch_ms",
            "Per-source fetch time (including retries) in milliseconds."
        );
        describe_gauge!(
            "collector_last_run_ts",
            "Unix ts when the last collection cycle started."
        );
    });
}

/// Orchestrates one collection cycle: every configured source is fetched
/// under the retry policy, raw records are normalized, and the merged batch
/// is handed to the sink. One source's exhaustion never aborts the cycle.
pub struct Pipeline {
    sources: Vec<Arc<dyn SourceAdapter>>,
    retry: RetryPolicy,
    normalizer: Arc<Normalizer>,
    sink: Arc<dyn Sink>,
    history: Arc<CycleHistory>,
}

enum SourceOutcome {
    Collected {
        source_name: String,
        records: Vec<CanonicalRecord>,
        dropped: usize,
    },
    Failed {
        source_name: String,
        failure: SourceFailure,
        attempts: u32,
    },
}

impl Pipeline {
    pub fn new(
        sources: Vec<Arc<dyn SourceAdapter>>,
        retry: RetryPolicy,
        normalizer: Arc<Normalizer>,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Self {
            sources,
            retry,
            normalizer,
            sink,
            history: Arc::new(CycleHistory::with_capacity(256)),
        }
    }

    pub fn with_history(mut self, history: Arc<CycleHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Run one cycle without an external shutdown signal (tests, one-shot use).
    pub async fn run_once(&self) -> Batch {
        let (_tx, rx) = watch::channel(false);
        self.run_cycle(&rx).await
    }

    /// Run one full cycle across all configured sources and hand the batch
    /// to the sink. Always returns a batch; an all-failed cycle returns an
    /// empty one and leaves the alarm decision to the caller.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> Batch {
        ensure_metrics_described();

        let collected_at = Utc::now();
        counter!("collector_cycles_total").increment(1);
        gauge!("collector_last_run_ts").set(collected_at.timestamp() as f64);
        tracing::info!(
            target: "collector",
            collected_at = %collected_at,
            "cycle_started"
        );

        // One task per source; sources are independent. Results are merged
        // back in declaration order, so batch ordering never depends on
        // completion order.
        let mut handles = Vec::with_capacity(self.sources.len());
        for adapter in &self.sources {
            if *shutdown.borrow() {
                break;
            }
            let adapter = Arc::clone(adapter);
            let normalizer = Arc::clone(&self.normalizer);
            let retry = self.retry;
            let shutdown_rx = shutdown.clone();
            let name = adapter.name().to_string();
            handles.push((
                name,
                tokio::spawn(collect_source(adapter, retry, normalizer, shutdown_rx)),
            ));
        }

        let mut batch = Batch::empty(collected_at);
        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(o) => o,
                Err(e) => {
                    // An adapter that panics has broken its contract; contain
                    // it as a failed source rather than poisoning the cycle.
                    tracing::error!(target: "collector", source = %name, error = %e, "source task aborted");
                    counter!("collector_source_errors_total").increment(1);
                    batch.failed_sources.insert(name);
                    continue;
                }
            };
            match outcome {
                SourceOutcome::Collected {
                    source_name,
                    records,
                    dropped,
                } => {
                    tracing::info!(
                        target: "collector",
                        source_name = %source_name,
                        record_count = records.len(),
                        "source_succeeded"
                    );
                    counter!("collector_records_total").increment(records.len() as u64);
                    if dropped > 0 {
                        counter!("collector_normalize_errors_total").increment(dropped as u64);
                    }
                    batch.records.extend(records);
                }
                SourceOutcome::Failed {
                    source_name,
                    failure,
                    attempts,
                } => {
                    tracing::warn!(
                        target: "collector",
                        source_name = %source_name,
                        error_kind = failure.kind.as_str(),
                        attempts,
                        error = %failure.message,
                        "source_failed"
                    );
                    counter!("collector_source_errors_total").increment(1);
                    batch.failed_sources.insert(source_name);
                }
            }
        }

        tracing::info!(
            target: "collector",
            batch_size = batch.records.len(),
            failed_sources = ?batch.failed_sources,
            "cycle_completed"
        );

        // Sink handoff. A sink failure is logged, never unwound into the cycle.
        match self.sink.accept(&batch).await {
            Ok(ack) => {
                tracing::debug!(target: "collector", accepted = ack.accepted, "sink accepted batch");
            }
            Err(e) => {
                tracing::warn!(target: "collector", error = %e, "sink rejected batch");
                counter!("collector_sink_errors_total").increment(1);
            }
        }

        self.history.record(&batch);
        batch
    }
}

async fn collect_source(
    adapter: Arc<dyn SourceAdapter>,
    retry: RetryPolicy,
    normalizer: Arc<Normalizer>,
    mut shutdown: watch::Receiver<bool>,
) -> SourceOutcome {
    let t0 = std::time::Instant::now();
    let outcome = retry.execute(adapter.as_ref(), &mut shutdown).await;
    histogram!("collector_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    match outcome.result {
        SourceResult::Success {
            records,
            fetched_at,
        } => {
            let mut out = Vec::with_capacity(records.len());
            let mut dropped = 0usize;
            for rec in &records {
                match normalizer.normalize(adapter.name(), rec, fetched_at) {
                    Ok(c) => out.push(c),
                    Err(e) => {
                        dropped += 1;
                        tracing::warn!(
                            target: "collector",
                            source_name = adapter.name(),
                            reason = %e.reason,
                            "record dropped by normalizer"
                        );
                    }
                }
            }
            SourceOutcome::Collected {
                source_name: adapter.name().to_string(),
                records: out,
                dropped,
            }
        }
        SourceResult::Failure(failure) => SourceOutcome::Failed {
            source_name: adapter.name().to_string(),
            failure,
            attempts: outcome.attempts,
        },
    }
}
