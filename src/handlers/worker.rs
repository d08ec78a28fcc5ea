//! # Worker API Handlers
//!
//! Inline queue drain, for deployments that trigger the worker externally
//! (e.g. a platform cron hitting the endpoint) instead of the built-in loop.

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::server::AppState;

/// Response payload for an inline queue drain
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DrainResponse {
    /// Jobs claimed by this drain
    pub processed: usize,
    /// Jobs that finished successfully
    pub succeeded: usize,
    /// Jobs skipped due to lock contention
    pub skipped: usize,
    /// Jobs returned to the queue with backoff
    pub retried: usize,
    /// Jobs failed terminally
    pub failed: usize,
}

/// Drain the sync job queue inline
#[utoipa::path(
    post,
    path = "/worker/run",
    responses(
        (status = 200, description = "Drain statistics", body = DrainResponse)
    ),
    tag = "worker"
)]
pub async fn run_worker(State(state): State<AppState>) -> Result<Json<DrainResponse>, ApiError> {
    let stats = state.worker.drain().await;

    Ok(Json(DrainResponse {
        processed: stats.processed(),
        succeeded: stats.succeeded,
        skipped: stats.skipped,
        retried: stats.retried,
        failed: stats.failed,
    }))
}
