//! API tests against the in-process router with mock processors.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{fixtures, TestFixture, EXPORT, GATED, THUMBNAIL};

// =============================================================================
// Basic API Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["config_hash"], "0123456789abcdef");
    assert!(response.body["version"].is_string());
}

#[tokio::test]
async fn test_config_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["server"]["host"], "127.0.0.1");
    assert_eq!(response.body["batch"]["max_concurrency"], 5);
    assert!(response.body["webhooks"].as_array().unwrap().is_empty());
}

// =============================================================================
// Job Submission
// =============================================================================

#[tokio::test]
async fn test_create_job_runs_to_completion() {
    let fixture = TestFixture::new().await;

    let id = fixture.submit(THUMBNAIL, 5).await;
    fixture.wait_for_job(&id).await;

    let response = fixture.get(&format!("/api/v1/jobs/{}", id)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["id"], id.as_str());
    assert_eq!(response.body["job_type"], THUMBNAIL);
    assert_eq!(response.body["status"], "completed");
    assert_eq!(response.body["progress"]["completed"], 5);
    assert_eq!(response.body["progress"]["percentage"], 100);
    assert_eq!(response.body["tasks"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_create_job_unknown_type_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({ "type": "transcode", "tasks": fixtures::task_specs(1) }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let error = response.body["error"].as_str().unwrap();
    assert!(error.contains("transcode"));
    assert!(error.contains(THUMBNAIL));
}

#[tokio::test]
async fn test_create_job_duplicate_task_ids_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({
                "type": THUMBNAIL,
                "tasks": [{ "id": "same" }, { "id": "same" }]
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("same"));
}

#[tokio::test]
async fn test_create_job_invalid_overrides_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({
                "type": THUMBNAIL,
                "tasks": fixtures::task_specs(2),
                "config": { "chunk_size": 0 }
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_job_overrides_applied() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({
                "type": THUMBNAIL,
                "tasks": fixtures::task_specs(3),
                "config": { "max_concurrency": 1, "retry_attempts": 0 }
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let id = response.body["id"].as_str().unwrap().to_string();
    fixture.wait_for_job(&id).await;

    let job = fixture.get(&format!("/api/v1/jobs/{}", id)).await;
    assert_eq!(job.body["config"]["max_concurrency"], 1);
    assert_eq!(job.body["config"]["retry_attempts"], 0);
    assert_eq!(job.body["config"]["chunk_size"], 2);
}

#[tokio::test]
async fn test_create_job_malformed_json() {
    let fixture = TestFixture::new().await;
    let response = fixture.post_raw("/api/v1/jobs", "{ not json").await;
    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_task_priority_respected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({
                "type": THUMBNAIL,
                "tasks": [
                    { "id": "late", "priority": 5 },
                    { "id": "early", "priority": -1 },
                    { "id": "middle" }
                ]
            }),
        )
        .await;
    let id = response.body["id"].as_str().unwrap().to_string();
    fixture.wait_for_job(&id).await;

    let job = fixture.get(&format!("/api/v1/jobs/{}", id)).await;
    let ids: Vec<&str> = job.body["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["early", "middle", "late"]);
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn test_get_unknown_job() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/jobs/does-not-exist").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = fixture.get("/api/v1/jobs/does-not-exist/report").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_jobs_with_filters() {
    let fixture = TestFixture::new().await;

    let done = fixture.submit(THUMBNAIL, 2).await;
    fixture.wait_for_job(&done).await;
    let running = fixture.submit(GATED, 2).await;
    fixture.gated.wait_for_calls(1).await;

    let all = fixture.get("/api/v1/jobs").await;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(all.body["count"], 2);
    assert!(all.body["jobs"][0].get("tasks").is_none());

    let completed = fixture.get("/api/v1/jobs?status=completed").await;
    assert_eq!(completed.body["count"], 1);
    assert_eq!(completed.body["jobs"][0]["id"], done.as_str());

    let gated = fixture.get(&format!("/api/v1/jobs?type={}", GATED)).await;
    assert_eq!(gated.body["count"], 1);
    assert_eq!(gated.body["jobs"][0]["id"], running.as_str());
    assert_eq!(gated.body["jobs"][0]["status"], "running");

    let limited = fixture.get("/api/v1/jobs?limit=1").await;
    assert_eq!(limited.body["count"], 1);

    fixture.gated.release(2);
    fixture.wait_for_job(&running).await;
}

#[tokio::test]
async fn test_list_jobs_invalid_status() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/jobs?status=sleeping").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_job_and_report() {
    let fixture = TestFixture::new().await;

    let id = fixture.submit(EXPORT, 4).await;
    fixture.wait_for_job(&id).await;

    let job = fixture.get(&format!("/api/v1/jobs/{}", id)).await;
    assert_eq!(job.body["status"], "failed");
    assert_eq!(job.body["progress"]["completed"], 3);
    assert_eq!(job.body["progress"]["failed"], 1);
    assert_eq!(job.body["errors"][0]["task_id"], "t-1");
    assert_eq!(job.body["errors"][0]["retry_count"], 3);

    let report = fixture.get(&format!("/api/v1/jobs/{}/report", id)).await;
    assert_eq!(report.status, StatusCode::OK);
    assert_eq!(report.body["job_id"], id.as_str());
    assert_eq!(report.body["partial_success"], true);
    assert_eq!(report.body["error_rate_percent"], 25.0);
    assert!(report.body["bottlenecks"].is_array());
}

// =============================================================================
// Job Control
// =============================================================================

#[tokio::test]
async fn test_pause_resume_cancel() {
    let fixture = TestFixture::new().await;

    let id = fixture.submit(GATED, 6).await;
    fixture.gated.wait_for_calls(1).await;

    let paused = fixture.post_empty(&format!("/api/v1/jobs/{}/pause", id)).await;
    assert_eq!(paused.status, StatusCode::OK);
    assert_eq!(paused.body["status"], "paused");

    let again = fixture.post_empty(&format!("/api/v1/jobs/{}/pause", id)).await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let resumed = fixture.post_empty(&format!("/api/v1/jobs/{}/resume", id)).await;
    assert_eq!(resumed.status, StatusCode::OK);
    assert_eq!(resumed.body["status"], "running");

    let cancelled = fixture.post_empty(&format!("/api/v1/jobs/{}/cancel", id)).await;
    assert_eq!(cancelled.status, StatusCode::OK);
    assert_eq!(cancelled.body["status"], "cancelled");

    fixture.gated.release(6);
    fixture.wait_for_job(&id).await;

    let job = fixture.get(&format!("/api/v1/jobs/{}", id)).await;
    assert_eq!(job.body["status"], "cancelled");
    assert_eq!(job.body["warnings"][0], "cancelled by request");

    let late = fixture.post_empty(&format!("/api/v1/jobs/{}/cancel", id)).await;
    assert_eq!(late.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_resume_running_job_conflicts() {
    let fixture = TestFixture::new().await;

    let id = fixture.submit(GATED, 2).await;
    fixture.gated.wait_for_calls(1).await;

    let response = fixture.post_empty(&format!("/api/v1/jobs/{}/resume", id)).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert!(response.body["error"].as_str().unwrap().contains("running"));

    fixture.gated.release(2);
    fixture.wait_for_job(&id).await;
}

#[tokio::test]
async fn test_control_unknown_job() {
    let fixture = TestFixture::new().await;

    for action in ["pause", "resume", "cancel"] {
        let response = fixture
            .post_empty(&format!("/api/v1/jobs/missing/{}", action))
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{}", action);
    }
}

// =============================================================================
// System and Metrics
// =============================================================================

#[tokio::test]
async fn test_system_metrics() {
    let fixture = TestFixture::new().await;

    let id = fixture.submit(GATED, 4).await;
    fixture.gated.wait_for_calls(2).await;

    let response = fixture.get("/api/v1/system/metrics").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["active_jobs"], 1);
    assert_eq!(response.body["total_concurrency"], 5);
    assert_eq!(response.body["in_flight_tasks"], 2);
    assert_eq!(response.body["system_memory_usage_mb"], 64.0);

    fixture.gated.release(4);
    fixture.wait_for_job(&id).await;

    let response = fixture.get("/api/v1/system/metrics").await;
    assert_eq!(response.body["active_jobs"], 0);
    assert_eq!(response.body["in_flight_tasks"], 0);
}

#[tokio::test]
async fn test_prometheus_endpoint() {
    let fixture = TestFixture::new().await;

    let id = fixture.submit(THUMBNAIL, 2).await;
    fixture.wait_for_job(&id).await;
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("deckbatch_http_requests_total"));
    assert!(body.contains("deckbatch_jobs_by_status"));
    assert!(body.contains("deckbatch_jobs_created_total"));
    assert!(body.contains("deckbatch_tasks_total"));
}
