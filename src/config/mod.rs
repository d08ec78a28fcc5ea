//! Configuration loading for the CreatorSync service.
//!
//! Loads a `.env` file plus environment variables prefixed with
//! `CREATORSYNC_`, producing a typed [`AppConfig`] with per-component
//! sections for the scheduler, queue worker, sync pipeline, and notifier.

use std::{collections::BTreeMap, env, net::SocketAddr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application configuration derived from `CREATORSYNC_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            scheduler: SchedulerConfig::default(),
            worker: WorkerConfig::default(),
            sync: SyncConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parse the configured API bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.api_bind_addr
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                value: self.api_bind_addr.clone(),
                source,
            })
    }
}

/// Scheduler (cron fan-out) tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SchedulerConfig {
    /// Seconds between fan-out ticks
    #[serde(default = "default_scheduler_tick_interval_seconds")]
    pub tick_interval_seconds: u64,
    /// Milliseconds slept between per-account enqueues within one tick
    #[serde(default = "default_scheduler_stagger_ms")]
    pub stagger_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: default_scheduler_tick_interval_seconds(),
            stagger_ms: default_scheduler_stagger_ms(),
        }
    }
}

/// Queue worker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct WorkerConfig {
    /// Milliseconds between worker ticks
    #[serde(default = "default_worker_tick_ms")]
    pub tick_ms: u64,
    /// Global concurrency ceiling: jobs in flight across all organizations
    #[serde(default = "default_worker_concurrency")]
    pub concurrency: usize,
    /// Maximum claim batches per drain invocation
    #[serde(default = "default_worker_max_batches")]
    pub max_batches: usize,
    /// Wall-clock budget for one drain invocation, in milliseconds
    #[serde(default = "default_worker_run_budget_ms")]
    pub run_budget_ms: u64,
    /// Seconds a single job may run before being timed out
    #[serde(default = "default_worker_job_timeout_seconds")]
    pub job_timeout_seconds: u64,
    /// Base of the exponential retry backoff, in seconds
    #[serde(default = "default_worker_retry_base_seconds")]
    pub retry_base_seconds: u64,
    /// Ceiling of the exponential retry backoff, in seconds
    #[serde(default = "default_worker_retry_max_seconds")]
    pub retry_max_seconds: u64,
    /// Milliseconds the immediate-sync endpoint waits before deferring to the queue
    #[serde(default = "default_worker_inline_timeout_ms")]
    pub inline_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_worker_tick_ms(),
            concurrency: default_worker_concurrency(),
            max_batches: default_worker_max_batches(),
            run_budget_ms: default_worker_run_budget_ms(),
            job_timeout_seconds: default_worker_job_timeout_seconds(),
            retry_base_seconds: default_worker_retry_base_seconds(),
            retry_max_seconds: default_worker_retry_max_seconds(),
            inline_timeout_ms: default_worker_inline_timeout_ms(),
        }
    }
}

/// Per-account sync pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncConfig {
    /// Most-recent items requested per discovery pass
    #[serde(default = "default_sync_discovery_limit")]
    pub discovery_limit: usize,
    /// Buffered storage operations per flushed transaction
    #[serde(default = "default_sync_flush_threshold")]
    pub flush_threshold: usize,
    /// Hard per-thumbnail download timeout, in milliseconds
    #[serde(default = "default_sync_thumbnail_timeout_ms")]
    pub thumbnail_timeout_ms: u64,
    /// Seconds after which a held account lock is considered stale
    #[serde(default = "default_sync_lock_staleness_seconds")]
    pub lock_staleness_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            discovery_limit: default_sync_discovery_limit(),
            flush_threshold: default_sync_flush_threshold(),
            thumbnail_timeout_ms: default_sync_thumbnail_timeout_ms(),
            lock_staleness_seconds: default_sync_lock_staleness_seconds(),
        }
    }
}

/// Notification trigger and orphan sweep tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct NotifierConfig {
    /// Seconds between orphaned-session sweeps
    #[serde(default = "default_notifier_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    /// Grace window before a completed, unmailed session counts as orphaned
    #[serde(default = "default_notifier_grace_seconds")]
    pub grace_seconds: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_notifier_sweep_interval_seconds(),
            grace_seconds: default_notifier_grace_seconds(),
        }
    }
}

fn default_profile() -> String {
    "dev".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost:5432/creatorsync".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5_000
}

fn default_scheduler_tick_interval_seconds() -> u64 {
    300
}

fn default_scheduler_stagger_ms() -> u64 {
    25
}

fn default_worker_tick_ms() -> u64 {
    5_000
}

fn default_worker_concurrency() -> usize {
    6
}

fn default_worker_max_batches() -> usize {
    20
}

fn default_worker_run_budget_ms() -> u64 {
    55_000
}

fn default_worker_job_timeout_seconds() -> u64 {
    300
}

fn default_worker_retry_base_seconds() -> u64 {
    5
}

fn default_worker_retry_max_seconds() -> u64 {
    900
}

fn default_worker_inline_timeout_ms() -> u64 {
    2_000
}

fn default_sync_discovery_limit() -> usize {
    25
}

fn default_sync_flush_threshold() -> usize {
    50
}

fn default_sync_thumbnail_timeout_ms() -> u64 {
    5_000
}

fn default_sync_lock_staleness_seconds() -> u64 {
    600
}

fn default_notifier_sweep_interval_seconds() -> u64 {
    60
}

fn default_notifier_grace_seconds() -> u64 {
    300
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("worker concurrency must be between 1 and 64, got {value}")]
    InvalidWorkerConcurrency { value: usize },
    #[error("worker retry base seconds ({base}) cannot exceed max seconds ({max})")]
    InvalidWorkerRetryBounds { base: u64, max: u64 },
    #[error("scheduler tick interval must be between 10 and 3600 seconds, got {value}")]
    InvalidSchedulerTickInterval { value: u64 },
    #[error("sync flush threshold must be at least 1, got {value}")]
    InvalidFlushThreshold { value: usize },
    #[error("sync discovery limit must be between 1 and 100, got {value}")]
    InvalidDiscoveryLimit { value: usize },
    #[error("lock staleness must be at least 60 seconds, got {value}")]
    InvalidLockStaleness { value: u64 },
}

/// Loads configuration from a `.env` file plus `CREATORSYNC_*` env vars.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load and validate the application configuration.
    ///
    /// The process environment wins over `.env` file entries.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut vars: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("CREATORSYNC_") {
                vars.insert(stripped.to_string(), value);
            }
        }

        let mut config = AppConfig::default();

        if let Some(value) = take(&mut vars, "PROFILE") {
            config.profile = value;
        }
        if let Some(value) = take(&mut vars, "API_BIND_ADDR") {
            config.api_bind_addr = value;
        }
        if let Some(value) = take(&mut vars, "LOG_LEVEL") {
            config.log_level = value;
        }
        if let Some(value) = take(&mut vars, "LOG_FORMAT") {
            config.log_format = value;
        }
        if let Some(value) = take(&mut vars, "DATABASE_URL") {
            config.database_url = value;
        }
        if let Some(value) = take_parsed(&mut vars, "DB_MAX_CONNECTIONS") {
            config.db_max_connections = value;
        }
        if let Some(value) = take_parsed(&mut vars, "DB_ACQUIRE_TIMEOUT_MS") {
            config.db_acquire_timeout_ms = value;
        }

        if let Some(value) = take_parsed(&mut vars, "SCHEDULER_TICK_INTERVAL_SECONDS") {
            config.scheduler.tick_interval_seconds = value;
        }
        if let Some(value) = take_parsed(&mut vars, "SCHEDULER_STAGGER_MS") {
            config.scheduler.stagger_ms = value;
        }

        if let Some(value) = take_parsed(&mut vars, "WORKER_TICK_MS") {
            config.worker.tick_ms = value;
        }
        if let Some(value) = take_parsed(&mut vars, "WORKER_CONCURRENCY") {
            config.worker.concurrency = value;
        }
        if let Some(value) = take_parsed(&mut vars, "WORKER_MAX_BATCHES") {
            config.worker.max_batches = value;
        }
        if let Some(value) = take_parsed(&mut vars, "WORKER_RUN_BUDGET_MS") {
            config.worker.run_budget_ms = value;
        }
        if let Some(value) = take_parsed(&mut vars, "WORKER_JOB_TIMEOUT_SECONDS") {
            config.worker.job_timeout_seconds = value;
        }
        if let Some(value) = take_parsed(&mut vars, "WORKER_RETRY_BASE_SECONDS") {
            config.worker.retry_base_seconds = value;
        }
        if let Some(value) = take_parsed(&mut vars, "WORKER_RETRY_MAX_SECONDS") {
            config.worker.retry_max_seconds = value;
        }
        if let Some(value) = take_parsed(&mut vars, "WORKER_INLINE_TIMEOUT_MS") {
            config.worker.inline_timeout_ms = value;
        }

        if let Some(value) = take_parsed(&mut vars, "SYNC_DISCOVERY_LIMIT") {
            config.sync.discovery_limit = value;
        }
        if let Some(value) = take_parsed(&mut vars, "SYNC_FLUSH_THRESHOLD") {
            config.sync.flush_threshold = value;
        }
        if let Some(value) = take_parsed(&mut vars, "SYNC_THUMBNAIL_TIMEOUT_MS") {
            config.sync.thumbnail_timeout_ms = value;
        }
        if let Some(value) = take_parsed(&mut vars, "SYNC_LOCK_STALENESS_SECONDS") {
            config.sync.lock_staleness_seconds = value;
        }

        if let Some(value) = take_parsed(&mut vars, "NOTIFIER_SWEEP_INTERVAL_SECONDS") {
            config.notifier.sweep_interval_seconds = value;
        }
        if let Some(value) = take_parsed(&mut vars, "NOTIFIER_GRACE_SECONDS") {
            config.notifier.grace_seconds = value;
        }

        validate(&config)?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take(vars: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    vars.remove(key).filter(|value| !value.is_empty())
}

fn take_parsed<T: std::str::FromStr>(vars: &mut BTreeMap<String, String>, key: &str) -> Option<T> {
    take(vars, key).and_then(|value| value.parse().ok())
}

fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    config.bind_addr()?;

    if !(1..=64).contains(&config.worker.concurrency) {
        return Err(ConfigError::InvalidWorkerConcurrency {
            value: config.worker.concurrency,
        });
    }
    if config.worker.retry_base_seconds > config.worker.retry_max_seconds {
        return Err(ConfigError::InvalidWorkerRetryBounds {
            base: config.worker.retry_base_seconds,
            max: config.worker.retry_max_seconds,
        });
    }
    if !(10..=3600).contains(&config.scheduler.tick_interval_seconds) {
        return Err(ConfigError::InvalidSchedulerTickInterval {
            value: config.scheduler.tick_interval_seconds,
        });
    }
    if config.sync.flush_threshold == 0 {
        return Err(ConfigError::InvalidFlushThreshold {
            value: config.sync.flush_threshold,
        });
    }
    if !(1..=100).contains(&config.sync.discovery_limit) {
        return Err(ConfigError::InvalidDiscoveryLimit {
            value: config.sync.discovery_limit,
        });
    }
    if config.sync.lock_staleness_seconds < 60 {
        return Err(ConfigError::InvalidLockStaleness {
            value: config.sync.lock_staleness_seconds,
        });
    }

    Ok(())
}
