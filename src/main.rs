//! # CreatorSync Main Entry Point
//!
//! Loads configuration, initializes tracing and the database pool, and
//! starts the API server with its background loops.

use std::sync::Arc;

use creatorsync::config::ConfigLoader;
use creatorsync::media::NullMediaStore;
use creatorsync::migration::{Migrator, MigratorTrait};
use creatorsync::notifier::LogChannel;
use creatorsync::providers::{FixtureProvider, Registry};
use creatorsync::server::run_server;
use creatorsync::{db, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config);

    let pool = db::init_pool(&config).await?;
    Migrator::up(&pool, None).await?;

    // Real platform scrapers register here; the fixture provider keeps
    // local profiles runnable without credentials.
    let mut registry = Registry::new();
    if config.profile != "prod" {
        registry.register(Arc::new(FixtureProvider::empty("fixture")));
    }

    run_server(
        config,
        pool,
        registry,
        Arc::new(NullMediaStore),
        Arc::new(LogChannel),
    )
    .await
}
