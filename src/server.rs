//! # Server Configuration
//!
//! Axum application assembly and the service runtime: HTTP surface plus the
//! scheduler, queue worker, and orphan-sweep background loops, all stopped
//! together through one cancellation token on shutdown.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::coordinator::SyncCoordinator;
use crate::handlers;
use crate::media::{MediaStore, ThumbnailFetcher};
use crate::notifier::{NotificationChannel, SessionNotifier};
use crate::providers::Registry;
use crate::scheduler::Scheduler;
use crate::worker::QueueWorker;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub registry: Arc<Registry>,
    pub worker: QueueWorker,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/syncs", post(handlers::syncs::enqueue_sync))
        .route(
            "/accounts/{account_id}/sync",
            post(handlers::syncs::sync_account_now),
        )
        .route("/worker/run", post(handlers::worker::run_worker))
        .route("/jobs", get(handlers::jobs::list_jobs))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the API server and background loops with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
    registry: Registry,
    media: Arc<dyn MediaStore>,
    channel: Arc<dyn NotificationChannel>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let registry = Arc::new(registry);

    let thumbnails = Arc::new(ThumbnailFetcher::new(
        config.sync.thumbnail_timeout_ms,
        media,
    ));
    let coordinator = SyncCoordinator::new(
        db.clone(),
        registry.clone(),
        thumbnails,
        config.sync.clone(),
    );
    let notifier = SessionNotifier::new(db.clone(), channel, config.notifier.clone());
    let worker = QueueWorker::new(
        db.clone(),
        coordinator,
        notifier.clone(),
        config.worker.clone(),
    );
    let scheduler = Scheduler::new(db.clone(), config.scheduler.clone());

    let shutdown = CancellationToken::new();
    let mut background = tokio::task::JoinSet::new();
    {
        let scheduler = scheduler.clone();
        let token = shutdown.clone();
        background.spawn(async move { scheduler.run(token).await });
    }
    {
        let worker = worker.clone();
        let token = shutdown.clone();
        background.spawn(async move { worker.run(token).await });
    }
    {
        let notifier = notifier.clone();
        let token = shutdown.clone();
        background.spawn(async move { notifier.run_sweep(token).await });
    }

    let state = AppState {
        db,
        config: config.clone(),
        registry,
        worker,
    };
    let app = create_app(state);

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %config.profile, "Server listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                }
                _ = serve_shutdown.cancelled() => {}
            }
        })
        .await?;

    shutdown.cancel();
    while background.join_next().await.is_some() {}
    info!("Background loops stopped");

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::syncs::enqueue_sync,
        crate::handlers::syncs::sync_account_now,
        crate::handlers::worker::run_worker,
        crate::handlers::jobs::list_jobs,
    ),
    components(
        schemas(
            crate::error::ApiError,
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::syncs::EnqueueSyncRequest,
            crate::handlers::jobs::JobInfo,
            crate::handlers::jobs::JobsResponse,
            crate::handlers::worker::DrainResponse,
        )
    ),
    info(
        title = "CreatorSync API",
        description = "Creator account sync orchestration",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
