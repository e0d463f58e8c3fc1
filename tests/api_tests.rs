mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use idempotency_gateway::api::routes::{create_router, AppState};
use idempotency_gateway::audit::MemoryAuditLog;
use idempotency_gateway::idempotency::KeyedRecordStore;
use idempotency_gateway::payment::PaymentService;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn test_app(payment_delay: Duration) -> (Router, Arc<MemoryAuditLog>) {
    test_app_with_store(common::memory_store(), payment_delay)
}

fn test_app_with_store(
    store: Arc<dyn KeyedRecordStore>,
    payment_delay: Duration,
) -> (Router, Arc<MemoryAuditLog>) {
    let (gate, audit) = common::gate(Arc::clone(&store), common::fast_gate_config());
    let payments = Arc::new(PaymentService::new(payment_delay));

    let state = AppState::new(store, gate, Arc::clone(&audit), payments);
    (create_router(state), audit)
}

fn payment_request(key: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/process-payment")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("Idempotency-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_key_returns_409() {
    let (app, _audit) = test_app(Duration::from_millis(0));
    let body = json!({ "amount": 100, "currency": "USD" });

    let response = app.oneshot(payment_request(None, &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await, json!({ "error": "key missing" }));
}

#[tokio::test]
async fn charge_then_replay_with_cache_hit_header() {
    let (app, _audit) = test_app(Duration::from_millis(0));
    let body = json!({ "amount": 100, "currency": "USD" });

    let first = app
        .clone()
        .oneshot(payment_request(Some("abc"), &body))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert!(first.headers().get("x-cache-hit").is_none());
    assert_eq!(
        body_json(first).await,
        json!({ "message": "Charged 100 USD" })
    );

    let second = app
        .oneshot(payment_request(Some("abc"), &body))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(
        second.headers().get("x-cache-hit").map(|v| v.to_str().unwrap()),
        Some("true")
    );
    assert_eq!(
        body_json(second).await,
        json!({ "message": "Charged 100 USD" })
    );
}

#[tokio::test]
async fn reused_key_with_different_body_returns_409() {
    let (app, _audit) = test_app(Duration::from_millis(0));

    let first = json!({ "amount": 100, "currency": "USD" });
    let second = json!({ "amount": 500, "currency": "USD" });

    let response = app
        .clone()
        .oneshot(payment_request(Some("abc"), &first))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(payment_request(Some("abc"), &second))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "key reused for different body" })
    );
}

#[tokio::test]
async fn missing_key_wins_over_invalid_body() {
    let (app, audit) = test_app(Duration::from_millis(0));
    let body = json!({ "amount": -5, "currency": "USD" });

    let response = app.oneshot(payment_request(None, &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await, json!({ "error": "key missing" }));

    let events: Vec<String> = audit.entries().iter().map(|e| e.event.clone()).collect();
    assert_eq!(events, vec!["NO_KEY"]);
}

#[tokio::test]
async fn unavailable_store_returns_503() {
    let (app, _audit) =
        test_app_with_store(Arc::new(common::UnavailableStore), Duration::from_millis(0));
    let body = json!({ "amount": 100, "currency": "USD" });

    let response = app
        .oneshot(payment_request(Some("abc"), &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "idempotency store unavailable" })
    );
}

#[tokio::test]
async fn invalid_body_returns_400() {
    let (app, _audit) = test_app(Duration::from_millis(0));
    let body = json!({ "amount": -5, "currency": "USD" });

    let response = app
        .oneshot(payment_request(Some("abc"), &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_duplicates_get_the_same_response() {
    let (app, _audit) = test_app(Duration::from_millis(200));
    let body = json!({ "amount": 42, "currency": "EUR" });

    let (first, second) = tokio::join!(
        app.clone().oneshot(payment_request(Some("dup"), &body)),
        app.clone().oneshot(payment_request(Some("dup"), &body)),
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_json(first).await, body_json(second).await);
}

#[tokio::test]
async fn audit_endpoint_lists_events_in_order() {
    let (app, _audit) = test_app(Duration::from_millis(0));
    let body = json!({ "amount": 100, "currency": "USD" });

    app.clone()
        .oneshot(payment_request(Some("abc"), &body))
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/admin/audit")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let entries = body_json(response).await;
    let events: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event"].as_str().unwrap())
        .collect();
    assert_eq!(events, vec!["RECEIVED", "COMPLETED"]);
}

#[tokio::test]
async fn health_reports_backend() {
    let (app, _audit) = test_app(Duration::from_millis(0));

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["store"]["backend"], "memory");
    assert_eq!(health["store"]["reachable"], true);
}

#[tokio::test]
async fn liveness_returns_200() {
    let (app, _audit) = test_app(Duration::from_millis(0));

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/live")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
