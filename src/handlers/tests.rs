//! # Tests for Handlers
//!
//! Handler-level tests invoking the extractor signatures directly against
//! an in-memory database.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::coordinator::SyncCoordinator;
use crate::handlers::jobs::{ListJobsQuery, list_jobs};
use crate::handlers::syncs::{
    EnqueueSyncRequest, enqueue_sync, inline_drain_status, sync_account_now,
};
use crate::handlers::worker::run_worker;
use crate::handlers::{healthz, root};
use crate::media::{NullMediaStore, ThumbnailFetcher};
use crate::notifier::{LogChannel, SessionNotifier};
use crate::providers::fixture::{FixtureProvider, fixture_item};
use crate::providers::Registry;
use crate::server::AppState;
use crate::test_support::{insert_account, insert_org_and_project};
use crate::worker::QueueWorker;

struct TestApp {
    state: AppState,
    provider: Arc<FixtureProvider>,
    account_id: Uuid,
}

async fn test_app() -> TestApp {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("in-memory db");
    Migrator::up(&db, None).await.expect("apply migrations");
    let (org_id, project_id) = insert_org_and_project(&db).await;
    let account_id = insert_account(&db, org_id, project_id, "fixture", "creator").await;

    let provider = Arc::new(FixtureProvider::empty("fixture"));
    let mut registry = Registry::new();
    registry.register(provider.clone());
    let registry = Arc::new(registry);

    let config = Arc::new(AppConfig::default());
    let coordinator = SyncCoordinator::new(
        db.clone(),
        registry.clone(),
        Arc::new(ThumbnailFetcher::new(1_000, Arc::new(NullMediaStore))),
        config.sync.clone(),
    );
    let notifier = SessionNotifier::new(db.clone(), Arc::new(LogChannel), config.notifier.clone());
    let worker = QueueWorker::new(db.clone(), coordinator, notifier, config.worker.clone());

    TestApp {
        state: AppState {
            db,
            config,
            registry,
            worker,
        },
        provider,
        account_id,
    }
}

#[tokio::test]
async fn root_reports_registered_platforms() {
    let app = test_app().await;
    let Json(info) = root(State(app.state)).await;
    assert_eq!(info.service, "creatorsync");
    assert_eq!(info.platforms, vec!["fixture".to_string()]);
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = test_app().await;
    let Json(health) = healthz(State(app.state)).await.expect("healthy");
    assert_eq!(health.status, "ok");
}

#[tokio::test]
async fn enqueue_sync_creates_queued_job() {
    let app = test_app().await;
    let (status, Json(job)) = enqueue_sync(
        State(app.state.clone()),
        Json(EnqueueSyncRequest {
            account_id: app.account_id,
            strategy: Some("discovery_only".to_string()),
            priority: None,
        }),
    )
    .await
    .expect("enqueue succeeds");

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job.status, "queued");
    assert_eq!(job.strategy, "discovery_only");

    let Json(listing) = list_jobs(
        State(app.state),
        Query(ListJobsQuery {
            status: Some("queued".to_string()),
            account_id: Some(app.account_id),
            limit: None,
        }),
    )
    .await
    .expect("list succeeds");
    assert_eq!(listing.jobs.len(), 1);
    assert_eq!(listing.jobs[0].id, job.id);
}

#[tokio::test]
async fn enqueue_sync_rejects_unknown_account() {
    let app = test_app().await;
    let err = enqueue_sync(
        State(app.state),
        Json(EnqueueSyncRequest {
            account_id: Uuid::new_v4(),
            strategy: None,
            priority: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn enqueue_sync_rejects_bad_strategy() {
    let app = test_app().await;
    let err = enqueue_sync(
        State(app.state),
        Json(EnqueueSyncRequest {
            account_id: app.account_id,
            strategy: Some("everything".to_string()),
            priority: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_jobs_rejects_bad_status_filter() {
    let app = test_app().await;
    let err = list_jobs(
        State(app.state),
        Query(ListJobsQuery {
            status: Some("exploded".to_string()),
            account_id: None,
            limit: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn worker_run_drains_queued_jobs() {
    let app = test_app().await;
    app.provider
        .set_items(vec![fixture_item("v1", Utc::now(), 100)]);

    enqueue_sync(
        State(app.state.clone()),
        Json(EnqueueSyncRequest {
            account_id: app.account_id,
            strategy: None,
            priority: None,
        }),
    )
    .await
    .expect("enqueue succeeds");

    let Json(drain) = run_worker(State(app.state)).await.expect("drain succeeds");
    assert_eq!(drain.processed, 1);
    assert_eq!(drain.succeeded, 1);
}

#[tokio::test]
async fn immediate_sync_finishes_inline() {
    let app = test_app().await;
    app.provider
        .set_items(vec![fixture_item("v1", Utc::now(), 100)]);

    let (status, Json(job)) = sync_account_now(State(app.state), Path(app.account_id))
        .await
        .expect("inline sync succeeds");

    assert_eq!(status, StatusCode::OK);
    assert_eq!(job.status, "succeeded");
    assert_eq!(job.strategy, "direct");
}

#[tokio::test]
async fn crashed_inline_drain_is_a_server_error() {
    use crate::worker::DrainStats;

    let job_id = Uuid::new_v4();
    assert_eq!(
        inline_drain_status(job_id, Ok(DrainStats::default())).unwrap(),
        StatusCode::OK
    );

    let handle = tokio::spawn(async { panic!("drain crashed") });
    let join_err = handle.await.unwrap_err();
    let err = inline_drain_status(job_id, Err(join_err)).unwrap_err();
    assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn immediate_sync_unknown_account_is_404() {
    let app = test_app().await;
    let err = sync_account_now(State(app.state), Path(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}
