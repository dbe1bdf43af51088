//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the full router in-process
//! with mock task processors registered, so job submission and control can be
//! exercised without any webhook endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use deckbatch_core::{
    create_mirror_system,
    testing::{MockProcessor, ScriptedMemorySampler},
    BatchOrchestrator, Config, DatabaseConfig, ProcessorRegistry, ServerConfig,
    SqliteDocumentMirror,
};
use deckbatch_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use deckbatch_core::testing::fixtures;

/// Job type served by a processor that always succeeds
pub const THUMBNAIL: &str = "thumbnail";

/// Job type whose calls block until released
pub const GATED: &str = "gated";

/// Job type where task `t-1` always fails
pub const EXPORT: &str = "export";

/// Test fixture for API testing with mock processors.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_job_submission() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/jobs", json!({
///         "type": "thumbnail",
///         "tasks": [{ "id": "t-0", "payload": {} }]
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Orchestrator behind the router
    pub orchestrator: Arc<BatchOrchestrator>,
    /// Processor for the gated job type, release calls from the test
    pub gated: Arc<MockProcessor>,
    /// Temporary directory for the mirror database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            ..Default::default()
        };

        let store = Arc::new(SqliteDocumentMirror::new(&db_path).expect("Failed to open mirror"));
        let (mirror_handle, mirror_writer) = create_mirror_system(store, 256);
        tokio::spawn(mirror_writer.run());

        let gated = Arc::new(MockProcessor::new().gated());
        let processors = ProcessorRegistry::new()
            .with(THUMBNAIL, Arc::new(MockProcessor::new()))
            .with(GATED, gated.clone())
            .with(EXPORT, Arc::new(MockProcessor::new().failing_for(["t-1"])));

        let orchestrator = Arc::new(
            BatchOrchestrator::new(fixtures::fast_config().with_chunk_size(2))
                .with_sampler(Arc::new(ScriptedMemorySampler::constant(64.0)))
                .with_mirror(mirror_handle),
        );

        let state = Arc::new(AppState::new(
            config,
            "0123456789abcdef".to_string(),
            Arc::clone(&orchestrator),
            processors,
        ));
        let router = create_router(state);

        Self {
            router,
            orchestrator,
            gated,
            temp_dir,
        }
    }

    /// Submit a job and return its id.
    pub async fn submit(&self, job_type: &str, tasks: usize) -> String {
        let response = self
            .post(
                "/api/v1/jobs",
                serde_json::json!({
                    "type": job_type,
                    "tasks": fixtures::task_specs(tasks),
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "body: {}", response.body);
        response.body["id"]
            .as_str()
            .expect("job id in response")
            .to_string()
    }

    /// Wait until the job reaches a terminal status.
    pub async fn wait_for_job(&self, id: &str) {
        tokio::time::timeout(Duration::from_secs(10), self.orchestrator.wait_for_job(id))
            .await
            .expect("job did not finish in time");
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a GET request and return the body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
