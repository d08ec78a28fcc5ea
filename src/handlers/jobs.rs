//! # Jobs API Handlers
//!
//! Listing endpoint for sync jobs.

use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, validation_error};
use crate::models::sync_job;
use crate::repositories::SyncJobRepository;
use crate::server::AppState;

const DEFAULT_LIMIT: u64 = 50;
const MAX_LIMIT: u64 = 100;

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// Filter by job status (one of: queued, running, succeeded, failed)
    pub status: Option<String>,
    /// Filter by account ID (UUID)
    pub account_id: Option<Uuid>,
    /// Maximum number of jobs to return (default: 50, max: 100)
    pub limit: Option<u64>,
}

/// Job information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Unique identifier for the sync job
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,
    /// Account this job synchronizes
    pub account_id: Uuid,
    /// Session this job belongs to, when dispatched by a fan-out
    pub session_id: Option<Uuid>,
    /// Sync strategy
    #[schema(example = "progressive")]
    pub strategy: String,
    /// Current status of the job
    #[schema(example = "queued")]
    pub status: String,
    /// Job priority for scheduling
    #[schema(example = 30)]
    pub priority: i16,
    /// Number of attempts made for this job
    pub attempts: i32,
    /// Attempt ceiling before the job fails terminally
    pub max_attempts: i32,
    /// Timestamp when the job is eligible to run
    pub scheduled_at: String,
    /// Timestamp when the job started execution
    pub started_at: Option<String>,
    /// Timestamp when the job finished execution
    pub finished_at: Option<String>,
    /// Result summary for succeeded jobs
    pub result: Option<JsonValue>,
    /// Structured error details if the job failed
    pub error: Option<JsonValue>,
}

impl From<sync_job::Model> for JobInfo {
    fn from(model: sync_job::Model) -> Self {
        Self {
            id: model.id,
            account_id: model.account_id,
            session_id: model.session_id,
            strategy: model.strategy,
            status: model.status,
            priority: model.priority,
            attempts: model.attempts,
            max_attempts: model.max_attempts,
            scheduled_at: model.scheduled_at.to_rfc3339(),
            started_at: model.started_at.map(|dt| dt.to_rfc3339()),
            finished_at: model.finished_at.map(|dt| dt.to_rfc3339()),
            result: model.result,
            error: model.error,
        }
    }
}

/// Response payload for jobs listing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobsResponse {
    /// List of jobs matching the query
    pub jobs: Vec<JobInfo>,
}

const VALID_STATUSES: &[&str] = &["queued", "running", "succeeded", "failed"];

/// List sync jobs with optional filters
#[utoipa::path(
    get,
    path = "/jobs",
    params(
        ("status" = Option<String>, Query, description = "Filter by job status"),
        ("account_id" = Option<Uuid>, Query, description = "Filter by account"),
        ("limit" = Option<u64>, Query, description = "Maximum jobs to return"),
    ),
    responses(
        (status = 200, description = "Jobs matching the query", body = JobsResponse),
        (status = 400, description = "Invalid filter", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobsResponse>, ApiError> {
    if let Some(status) = &query.status
        && !VALID_STATUSES.contains(&status.as_str())
    {
        return Err(validation_error(
            "Invalid status filter",
            serde_json::json!({ "status": status, "expected": VALID_STATUSES }),
        ));
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let jobs = SyncJobRepository::new(&state.db)
        .list(query.status, query.account_id, limit)
        .await?;

    Ok(Json(JobsResponse {
        jobs: jobs.into_iter().map(JobInfo::from).collect(),
    }))
}
