//! HTTP-level tests against the in-memory application.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_app() -> Router {
    let handle = PrometheusBuilder::new().build_recorder().handle();
    api::create_app(api::create_in_memory_state(), handle)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_checkout(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/checkouts")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn paid_body(key: &str, amount_cents: i64) -> Value {
    json!({
        "idempotency_key": key,
        "organization_name": "Acme",
        "tier": "standard",
        "amount_cents": amount_cents,
        "currency": "usd",
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let app = test_app();
    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn create_paid_checkout_returns_created() {
    let app = test_app();
    let (status, body) = send(&app, post_checkout(paid_body("abc123", 1500))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["flow"], "paid_checkout");
    assert_eq!(body["idempotency_key"], "abc123");
    assert_eq!(body["replayed"], false);
    assert!(body["checkout_url"].as_str().unwrap().starts_with("https://"));
    assert!(body["attempt_id"].as_str().is_some());
}

#[tokio::test]
async fn duplicate_submission_returns_ok_with_same_url() {
    let app = test_app();

    let (_, first) = send(&app, post_checkout(paid_body("abc123", 1500))).await;
    let (status, second) = send(&app, post_checkout(paid_body("abc123", 1500))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["replayed"], true);
    assert_eq!(second["checkout_url"], first["checkout_url"]);
    assert_eq!(second["attempt_id"], first["attempt_id"]);
}

#[tokio::test]
async fn mismatched_reuse_returns_conflict() {
    let app = test_app();

    send(&app, post_checkout(paid_body("abc123", 1500))).await;
    let (status, body) = send(&app, post_checkout(paid_body("abc123", 2000))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["idempotency_key"], "abc123");
    assert!(body["attempt_id"].as_str().is_some());
    assert!(body["error"].as_str().unwrap().contains("abc123"));
}

#[tokio::test]
async fn unknown_tier_returns_bad_request() {
    let app = test_app();
    let body = json!({
        "organization_name": "Acme",
        "tier": "platinum",
    });

    let (status, body) = send(&app, post_checkout(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("platinum"));
}

#[tokio::test]
async fn invalid_owner_id_returns_bad_request() {
    let app = test_app();
    let mut body = paid_body("abc123", 1500);
    body["owner_id"] = json!("not-a-uuid");

    let (status, _) = send(&app, post_checkout(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_endpoint_reflects_the_attempt() {
    let app = test_app();

    let (status, _) = send(&app, get("/checkouts/abc123")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app, post_checkout(paid_body("abc123", 1500))).await;

    let (status, body) = send(&app, get("/checkouts/abc123")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["idempotency_key"], "abc123");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["flow"], "paid_checkout");
    assert!(body["checkout_url"].as_str().is_some());
}

#[tokio::test]
async fn enterprise_checkout_provisions_sales_led() {
    let app = test_app();
    let body = json!({
        "organization_name": "Globex",
        "tier": "enterprise",
    });

    let (status, first) = send(&app, post_checkout(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["flow"], "sales_led");
    assert!(first["organization_id"].as_str().is_some());
    assert!(first["subscription_id"].as_str().is_some());
    assert!(first.get("checkout_url").is_none());

    // A duplicate submission is blocked by the organization slug.
    let (status, second) = send(&app, post_checkout(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(second["error"].as_str().unwrap().contains("globex"));
}

#[tokio::test]
async fn metrics_endpoint_renders_prometheus_text() {
    let app = test_app();
    send(&app, post_checkout(paid_body("abc123", 1500))).await;

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
