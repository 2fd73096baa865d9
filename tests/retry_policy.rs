// tests/retry_policy.rs
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use crypto_news_aggregator::collect::retry::RetryPolicy;
use crypto_news_aggregator::collect::types::{
    ErrorKind, SourceAdapter, SourceFailure, SourceResult,
};

/// Plays back a scripted sequence of results, recording call instants.
/// Once the script runs dry it keeps returning success.
struct ScriptedAdapter {
    name: &'static str,
    script: Mutex<Vec<SourceResult>>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedAdapter {
    fn new(name: &'static str, script: Vec<SourceResult>) -> Self {
        Self {
            name,
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Gaps between consecutive fetch calls.
    fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock().unwrap();
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    async fn fetch(&self) -> SourceResult {
        self.calls.lock().unwrap().push(Instant::now());
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            SourceResult::success(vec![])
        } else {
            script.remove(0)
        }
    }

    fn name(&self) -> &str {
        self.name
    }
}

fn transient(name: &str) -> SourceResult {
    SourceResult::failure(name, ErrorKind::Transient, "http status 502")
}

fn policy(max_attempts: u32, base_secs: u64, multiplier: f64) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_secs(base_secs),
        backoff_multiplier: multiplier,
    }
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_with_exponential_backoff() {
    let adapter = ScriptedAdapter::new(
        "prices",
        vec![transient("prices"), transient("prices"), transient("prices")],
    );
    let (_tx, mut rx) = watch::channel(false);

    let out = policy(3, 1, 2.0).execute(&adapter, &mut rx).await;

    // Exactly max_attempts fetches, with 1s and 2s between them.
    assert_eq!(adapter.call_count(), 3);
    assert_eq!(out.attempts, 3);
    assert_eq!(
        adapter.gaps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    match out.result {
        SourceResult::Failure(f) => {
            assert_eq!(f.kind, ErrorKind::Transient);
            assert_eq!(f.message, "http status 502");
        }
        SourceResult::Success { .. } => panic!("expected the last failure back"),
    }
}

#[tokio::test(start_paused = true)]
async fn success_on_second_attempt_stops_retrying() {
    let adapter = ScriptedAdapter::new("prices", vec![transient("prices")]);
    let (_tx, mut rx) = watch::channel(false);

    let out = policy(5, 1, 2.0).execute(&adapter, &mut rx).await;

    assert_eq!(adapter.call_count(), 2);
    assert_eq!(out.attempts, 2);
    assert!(out.result.is_success());
}

#[tokio::test(start_paused = true)]
async fn malformed_fails_fast_without_retry() {
    let adapter = ScriptedAdapter::new(
        "prices",
        vec![SourceResult::failure(
            "prices",
            ErrorKind::Malformed,
            "unparsable payload",
        )],
    );
    let (_tx, mut rx) = watch::channel(false);

    let out = policy(5, 1, 2.0).execute(&adapter, &mut rx).await;

    assert_eq!(adapter.call_count(), 1);
    assert_eq!(out.attempts, 1);
    match out.result {
        SourceResult::Failure(f) => assert_eq!(f.kind, ErrorKind::Malformed),
        SourceResult::Success { .. } => panic!("expected failure"),
    }
}

#[tokio::test(start_paused = true)]
async fn unauthorized_fails_fast_without_retry() {
    let adapter = ScriptedAdapter::new(
        "news",
        vec![SourceResult::failure(
            "news",
            ErrorKind::Unauthorized,
            "http status 401",
        )],
    );
    let (_tx, mut rx) = watch::channel(false);

    let out = policy(5, 1, 2.0).execute(&adapter, &mut rx).await;

    assert_eq!(adapter.call_count(), 1);
    match out.result {
        SourceResult::Failure(f) => assert_eq!(f.kind, ErrorKind::Unauthorized),
        SourceResult::Success { .. } => panic!("expected failure"),
    }
}

#[tokio::test(start_paused = true)]
async fn provider_retry_after_overrides_computed_backoff() {
    let rate_limited = SourceResult::Failure(
        SourceFailure::new("prices", ErrorKind::RateLimited, "http status 429")
            .with_retry_after(Some(Duration::from_secs(7))),
    );
    let adapter = ScriptedAdapter::new("prices", vec![rate_limited]);
    let (_tx, mut rx) = watch::channel(false);

    let out = policy(3, 1, 2.0).execute(&adapter, &mut rx).await;

    // Computed backoff would be 1s; the advertised 7s wins.
    assert_eq!(adapter.gaps(), vec![Duration::from_secs(7)]);
    assert!(out.result.is_success());
}

#[tokio::test(start_paused = true)]
async fn never_exceeds_max_attempts() {
    let script: Vec<SourceResult> = (0..10).map(|_| transient("prices")).collect();
    let adapter = ScriptedAdapter::new("prices", script);
    let (_tx, mut rx) = watch::channel(false);

    let out = policy(4, 1, 1.0).execute(&adapter, &mut rx).await;

    assert_eq!(adapter.call_count(), 4);
    assert_eq!(out.attempts, 4);
    assert!(!out.result.is_success());
}

#[tokio::test]
async fn shutdown_cancels_an_inflight_backoff_sleep() {
    let script: Vec<SourceResult> = (0..10).map(|_| transient("prices")).collect();
    let adapter = std::sync::Arc::new(ScriptedAdapter::new("prices", script));
    let (tx, mut rx) = watch::channel(false);

    let task = {
        let adapter = std::sync::Arc::clone(&adapter);
        tokio::spawn(async move {
            policy(10, 3600, 1.0).execute(adapter.as_ref(), &mut rx).await
        })
    };

    // Let the first fetch fail and the hour-long backoff begin.
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    let started = std::time::Instant::now();
    let out = task.await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(adapter.call_count(), 1);
    assert!(!out.result.is_success());
}

#[tokio::test]
async fn shutdown_already_raised_skips_the_fetch_entirely() {
    let adapter = ScriptedAdapter::new("prices", vec![]);
    let (tx, mut rx) = watch::channel(false);
    tx.send(true).unwrap();

    let out = policy(3, 1, 2.0).execute(&adapter, &mut rx).await;

    assert_eq!(adapter.call_count(), 0);
    assert_eq!(out.attempts, 0);
    assert!(!out.result.is_success());
}
