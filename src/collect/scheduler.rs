// src/collect/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::collect::Pipeline;

/// Fires the pipeline at a fixed interval, one cycle at a time. Cycles are
/// awaited inline, so overlap is impossible; a cycle that overruns the
/// interval causes the missed tick to be skipped, not queued.
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Spawn the collection loop. The first cycle runs immediately.
    pub fn start(interval: Duration, pipeline: Arc<Pipeline>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(interval, pipeline, shutdown_rx));
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal shutdown and wait for an in-progress cycle to wind down.
    /// Once this returns, no further cycle starts.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!(target: "collector", error = %e, "scheduler task join failed");
        }
    }
}

async fn run_loop(interval: Duration, pipeline: Arc<Pipeline>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        target: "collector",
        interval_secs = interval.as_secs(),
        sources = ?pipeline.source_names(),
        "scheduler started"
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                pipeline.run_cycle(&shutdown).await;
            }
        }
    }

    tracing::info!(target: "collector", "scheduler stopped");
}
