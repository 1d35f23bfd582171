//! Handler-level tests for request validation.
//!
//! These exercise paths that are rejected before any query runs, so the
//! pool is a lazy one that never actually connects.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use markbatch_api::config::ServerConfig;
use markbatch_api::engine::progress::ProgressLedger;
use markbatch_api::routes;
use markbatch_api::state::AppState;
use markbatch_cache::ResultCache;
use markbatch_core::filtering::FilterPolicy;
use markbatch_core::progress::FlushPolicy;
use markbatch_events::EventBus;
use markbatch_registry::{RegistryClient, RegistryConfig};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        cors_origins: vec![],
        request_timeout_secs: 5,
        max_batch_size: 10,
        registry: RegistryConfig {
            base_url: "http://localhost:1".into(),
            api_key: None,
            requests_per_minute: 60,
            timeout: Duration::from_secs(1),
        },
        filter: FilterPolicy::default(),
        flush: FlushPolicy::default(),
        dispatch_poll_interval: Duration::from_secs(1),
        stall_window: Duration::from_secs(60),
        stall_poll_interval: Duration::from_secs(15),
        max_requeues: 2,
        cache_capacity: 16,
        cache_active_ttl: Duration::from_secs(10),
        cache_terminal_ttl: Duration::from_secs(60),
    }
}

fn test_app() -> Router {
    let config = test_config();
    let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/unused");
    let pool = pool.expect("lazy pool");

    let state = AppState {
        pool,
        registry: Arc::new(RegistryClient::new(config.registry.clone()).expect("client")),
        cache: Arc::new(ResultCache::new(
            config.cache_capacity,
            config.cache_active_ttl,
            config.cache_terminal_ttl,
        )),
        event_bus: Arc::new(EventBus::default()),
        ledger: Arc::new(ProgressLedger::new()),
        config: Arc::new(config),
    };

    Router::new()
        .nest("/api/v1", routes::api_routes())
        .with_state(state)
}

async fn send_json(app: Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let (status, body) = send_json(
        test_app(),
        "POST",
        "/api/v1/jobs",
        json!({ "serial_numbers": [] }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn oversized_batch_is_rejected() {
    let serials: Vec<String> = (0..11).map(|n| format!("8800{n:04}")).collect();
    let (status, body) = send_json(
        test_app(),
        "POST",
        "/api/v1/jobs",
        json!({ "serial_numbers": serials }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["error"].as_str().unwrap().contains("maximum of 10"));
}

#[tokio::test]
async fn malformed_serials_pass_submit_validation() {
    // Malformed identifiers are not a batch-level error: they are
    // accepted here and classified not_found during processing. The
    // lazy pool cannot connect, so reaching the store (and failing
    // there) proves validation let the batch through.
    let (status, body) = send_json(
        test_app(),
        "POST",
        "/api/v1/jobs",
        json!({ "serial_numbers": ["88000001", "not-a-serial", "1234567"] }),
    )
    .await;

    assert_ne!(status, StatusCode::BAD_REQUEST);
    assert_ne!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_workflow_status_is_rejected() {
    let (status, body) = send_json(
        test_app(),
        "PATCH",
        "/api/v1/jobs/1/workflow",
        json!({ "actor_id": 1, "next": "shipped" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn workflow_cannot_target_assignment_states() {
    for target in ["unassigned", "assigned"] {
        let (status, body) = send_json(
            test_app(),
            "PATCH",
            "/api/v1/jobs/1/workflow",
            json!({ "actor_id": 1, "next": target }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "target {target}");
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }
}
