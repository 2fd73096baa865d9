// tests/api_http.rs
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use tower::ServiceExt;

use crypto_news_aggregator::api::{create_router, AppState};
use crypto_news_aggregator::collect::types::Batch;
use crypto_news_aggregator::history::CycleHistory;

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_answers_ok() {
    let state = AppState {
        history: Arc::new(CycleHistory::with_capacity(8)),
    };
    let app = create_router(state);

    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_reflects_the_latest_cycle() {
    let history = Arc::new(CycleHistory::with_capacity(8));
    let app = create_router(AppState {
        history: Arc::clone(&history),
    });

    // Before any cycle: last_cycle is null.
    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert!(json["last_cycle"].is_null());

    // After one recorded batch the summary shows up.
    let mut batch = Batch::empty(Utc::now());
    batch.failed_sources.insert("crypto_news".to_string());
    history.record(&batch);

    let resp = app
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["last_cycle"]["batch_size"], 0);
    assert_eq!(json["last_cycle"]["failed_sources"][0], "crypto_news");
}

#[tokio::test]
async fn recent_lists_summaries_in_order() {
    let history = Arc::new(CycleHistory::with_capacity(8));
    for _ in 0..3 {
        history.record(&Batch::empty(Utc::now()));
    }
    let app = create_router(AppState { history });

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/status/recent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json.as_array().unwrap().len(), 3);
}
