//! Read-path tests for the polling endpoint.
//!
//! The pool is a lazy one that never connects, so anything these tests
//! observe was served from the snapshot cache and the live ledger.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use markbatch_api::config::ServerConfig;
use markbatch_api::engine::progress::ProgressLedger;
use markbatch_api::routes;
use markbatch_api::state::AppState;
use markbatch_cache::{JobSnapshot, ResultCache};
use markbatch_core::filtering::FilterPolicy;
use markbatch_core::progress::FlushPolicy;
use markbatch_core::types::DbId;
use markbatch_db::models::job::Job;
use markbatch_db::models::result::LookupResult;
use markbatch_db::models::status::{JobStatus, ResultStatus, WorkflowStatus};
use markbatch_events::EventBus;
use markbatch_registry::{RegistryClient, RegistryConfig};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

fn test_state() -> AppState {
    let config = ServerConfig {
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
    };
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://127.0.0.1:1/unused")
        .expect("lazy pool");

    AppState {
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
    }
}

fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .with_state(state)
}

fn completed_job(id: DbId) -> Job {
    let now = Utc::now();
    Job {
        id,
        status_id: JobStatus::Completed.id(),
        submitted_by: Some(1),
        serial_numbers: vec!["88000001".into(), "88000002".into(), "88000003".into()],
        total_count: 3,
        processed_count: 3,
        fetched_count: 2,
        retained_count: 1,
        excluded_count: 1,
        error_message: None,
        retry_of_job_id: None,
        claimed_at: None,
        heartbeat_at: None,
        requeue_count: 0,
        assignee_id: None,
        workflow_status_id: WorkflowStatus::Unassigned.id(),
        assigned_at: None,
        downloaded_at: None,
        work_started_at: None,
        finished_at: None,
        created_at: now,
        completed_at: Some(now),
        updated_at: now,
    }
}

fn result_row(job_id: DbId, position: i32, serial: &str, status: ResultStatus) -> LookupResult {
    LookupResult {
        id: i64::from(position) + 1,
        job_id,
        position,
        serial_number: serial.into(),
        status_id: status.id(),
        owner_name: None,
        mark_text: None,
        filing_date: None,
        registration_number: None,
        mark_status: None,
        attorney_name: None,
        error_message: None,
        created_at: Utc::now(),
    }
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn cached_snapshot_answers_the_poll_without_the_store() {
    let state = test_state();
    state.cache.insert(JobSnapshot {
        job: completed_job(1),
        results: vec![
            result_row(1, 0, "88000001", ResultStatus::Success),
            result_row(1, 1, "88000002", ResultStatus::Filtered),
            result_row(1, 2, "88000003", ResultStatus::NotFound),
        ],
    });

    let (status, body) = get_json(app(state), "/api/v1/jobs/1/status").await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["status"], "completed");
    assert_eq!(data["progress"]["total"], 3);
    assert_eq!(data["progress"]["processed"], 3);
    assert_eq!(data["progress"]["percentage"], 100);

    // Filtered rows stay out of the payload.
    let results = data["results"].as_array().expect("results present");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["serial_number"], "88000001");
    assert_eq!(results[1]["serial_number"], "88000003");
}

#[tokio::test]
async fn pending_jobs_poll_without_results() {
    let state = test_state();
    let mut job = completed_job(2);
    job.status_id = JobStatus::Pending.id();
    job.processed_count = 0;
    job.completed_at = None;
    state.cache.insert(JobSnapshot {
        job,
        results: Vec::new(),
    });

    let (status, body) = get_json(app(state), "/api/v1/jobs/2/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"].get("results").is_none());
}
