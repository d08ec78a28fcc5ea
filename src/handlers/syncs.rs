//! # Sync API Handlers
//!
//! Enqueue endpoint for sync jobs, plus the immediate per-account sync that
//! dispatches inline under a short timeout and falls back to the queue.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use tokio::task::JoinError;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, validation_error};
use crate::handlers::jobs::JobInfo;
use crate::models::sync_job::{PRIORITY_MANUAL, PRIORITY_SCHEDULED, SyncStrategy};
use crate::repositories::{AccountRepository, NewJob, SyncJobRepository};
use crate::server::AppState;
use crate::worker::DrainStats;

/// Request payload for enqueueing a sync job
#[derive(Debug, Deserialize, ToSchema)]
pub struct EnqueueSyncRequest {
    /// Account to synchronize
    pub account_id: Uuid,
    /// Sync strategy (one of: progressive, discovery_only, refresh_only, direct)
    pub strategy: Option<String>,
    /// Job priority; defaults to the scheduled priority
    pub priority: Option<i16>,
}

/// Enqueue a sync job for an account
#[utoipa::path(
    post,
    path = "/syncs",
    request_body = EnqueueSyncRequest,
    responses(
        (status = 201, description = "Job enqueued", body = JobInfo),
        (status = 400, description = "Invalid strategy", body = ApiError),
        (status = 404, description = "Account not found", body = ApiError)
    ),
    tag = "syncs"
)]
pub async fn enqueue_sync(
    State(state): State<AppState>,
    Json(request): Json<EnqueueSyncRequest>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    let strategy = match request.strategy.as_deref() {
        Some(raw) => raw.parse::<SyncStrategy>().map_err(|err| {
            validation_error("Invalid sync strategy", serde_json::json!({ "strategy": err }))
        })?,
        None => SyncStrategy::Progressive,
    };

    let account = AccountRepository::new(&state.db)
        .find(request.account_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Account not found"))?;

    let job = SyncJobRepository::new(&state.db)
        .enqueue(NewJob {
            organization_id: account.organization_id,
            project_id: account.project_id,
            account_id: account.id,
            session_id: None,
            strategy,
            priority: request.priority.unwrap_or(PRIORITY_SCHEDULED),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(job.into())))
}

/// Immediately sync one account.
///
/// Enqueues a manual-priority job and drains the queue inline under
/// `worker.inline_timeout_ms`. If the drain does not finish in time the
/// response is 202 and the job stays queued for the background worker.
#[utoipa::path(
    post,
    path = "/accounts/{account_id}/sync",
    params(
        ("account_id" = Uuid, Path, description = "Account to synchronize"),
    ),
    responses(
        (status = 200, description = "Sync finished inline", body = JobInfo),
        (status = 202, description = "Sync deferred to the queue worker", body = JobInfo),
        (status = 404, description = "Account not found", body = ApiError)
    ),
    tag = "syncs"
)]
pub async fn sync_account_now(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    let account = AccountRepository::new(&state.db)
        .find(account_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Account not found"))?;

    let jobs = SyncJobRepository::new(&state.db);
    let job = jobs
        .enqueue(NewJob {
            organization_id: account.organization_id,
            project_id: account.project_id,
            account_id: account.id,
            session_id: None,
            strategy: SyncStrategy::Direct,
            priority: PRIORITY_MANUAL,
        })
        .await?;

    // Drive the queue inline; the drain picks this job first by priority.
    // The spawned drain survives the timeout, so a slow sync still finishes
    // in the background.
    let worker = state.worker.clone();
    let inline = tokio::spawn(async move { worker.drain().await });
    let timeout = std::time::Duration::from_millis(state.config.worker.inline_timeout_ms);

    let status = match tokio::time::timeout(timeout, inline).await {
        Ok(joined) => inline_drain_status(job.id, joined)?,
        Err(_) => {
            info!(job_id = %job.id, "Inline sync timed out; deferring to queue worker");
            StatusCode::ACCEPTED
        }
    };

    let current = jobs.find(job.id).await?.unwrap_or(job);
    Ok((status, Json(current.into())))
}

/// Map a finished inline drain to a response status. A drain task that
/// panicked or was cancelled is a server fault, not a successful sync.
pub(super) fn inline_drain_status(
    job_id: Uuid,
    joined: Result<DrainStats, JoinError>,
) -> Result<StatusCode, ApiError> {
    match joined {
        Ok(_) => Ok(StatusCode::OK),
        Err(err) => {
            error!(job_id = %job_id, error = %err, "Inline drain task failed");
            Err(ApiError::internal("Inline sync failed"))
        }
    }
}
