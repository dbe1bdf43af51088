//! Job API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use deckbatch_core::{
    BatchError, JobConfigOverrides, JobFilter, JobProgress, JobRecord, JobStatus,
    PerformanceReport, TaskSpec,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Maximum allowed limit for job listings
const MAX_LIMIT: usize = 1000;

/// Default limit for job listings
const DEFAULT_LIMIT: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a job
#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    /// Job type, selects the registered processor
    #[serde(rename = "type")]
    pub job_type: String,
    pub tasks: Vec<TaskSpec>,
    /// Per-job overrides of the configured defaults
    pub config: Option<JobConfigOverrides>,
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by status (e.g. "running")
    pub status: Option<String>,
    /// Filter by job type
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    /// Maximum number of jobs to return
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub id: String,
}

/// Result of a pause, resume or cancel request
#[derive(Debug, Serialize)]
pub struct JobControlResponse {
    pub id: String,
    pub status: JobStatus,
}

/// Job listing entry (tasks omitted)
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_count: usize,
}

impl From<JobRecord> for JobSummary {
    fn from(job: JobRecord) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            status: job.status,
            progress: job.progress,
            created_at: job.created_at,
            start_time: job.start_time,
            end_time: job.end_time,
            error_count: job.errors.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobSummary>,
    pub count: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn not_found(id: &str) -> ApiError {
    error_response(StatusCode::NOT_FOUND, format!("Job not found: {}", id))
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a job.
///
/// POST /api/v1/jobs
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateJobBody>,
) -> Result<(StatusCode, Json<CreateJobResponse>), impl IntoResponse> {
    let Some(processor) = state.processors().get(&body.job_type) else {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "Unknown job type '{}'. Registered types: {}",
                body.job_type,
                state.processors().job_types().join(", ")
            ),
        ));
    };

    match state
        .orchestrator()
        .create_job(&body.job_type, body.tasks, processor, body.config)
        .await
    {
        Ok(id) => Ok((StatusCode::CREATED, Json(CreateJobResponse { id }))),
        Err(e @ (BatchError::InvalidConfig(_) | BatchError::DuplicateTaskId(_))) => {
            Err(error_response(StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => {
            tracing::error!("Failed to create job: {}", e);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to create job: {}", e),
            ))
        }
    }
}

/// List jobs, newest first.
///
/// GET /api/v1/jobs?status=&type=&limit=
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let mut filter = JobFilter::new().with_limit(limit);

    if let Some(status) = params.status.as_deref() {
        match JobStatus::parse(status) {
            Some(status) => filter = filter.with_status(status),
            None => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid status filter: {}", status),
                ))
            }
        }
    }
    if let Some(job_type) = params.job_type {
        filter = filter.with_job_type(job_type);
    }

    let jobs: Vec<JobSummary> = state
        .orchestrator()
        .list_jobs(&filter)
        .await
        .into_iter()
        .map(JobSummary::from)
        .collect();
    let count = jobs.len();

    Ok(Json(ListJobsResponse { jobs, count }))
}

/// Get a full job record.
///
/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, impl IntoResponse> {
    state
        .orchestrator()
        .get_job_status(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

/// POST /api/v1/jobs/{id}/pause
pub async fn pause_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobControlResponse>, impl IntoResponse> {
    control(&state, &id, "pause").await
}

/// POST /api/v1/jobs/{id}/resume
pub async fn resume_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobControlResponse>, impl IntoResponse> {
    control(&state, &id, "resume").await
}

/// POST /api/v1/jobs/{id}/cancel
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobControlResponse>, impl IntoResponse> {
    control(&state, &id, "cancel").await
}

async fn control(
    state: &AppState,
    id: &str,
    action: &str,
) -> Result<Json<JobControlResponse>, ApiError> {
    let orchestrator = state.orchestrator();
    let Some(job) = orchestrator.get_job_status(id).await else {
        return Err(not_found(id));
    };

    let applied = match action {
        "pause" => orchestrator.pause_job(id).await,
        "resume" => orchestrator.resume_job(id).await,
        _ => orchestrator.cancel_job(id).await,
    };
    if !applied {
        return Err(error_response(
            StatusCode::CONFLICT,
            format!("Cannot {} job {} in status {}", action, id, job.status),
        ));
    }

    let status = orchestrator
        .get_job_status(id)
        .await
        .map(|job| job.status)
        .ok_or_else(|| not_found(id))?;
    Ok(Json(JobControlResponse {
        id: id.to_string(),
        status,
    }))
}

/// Performance report with bottleneck analysis.
///
/// GET /api/v1/jobs/{id}/report
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PerformanceReport>, impl IntoResponse> {
    state
        .orchestrator()
        .generate_performance_report(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(&id))
}
