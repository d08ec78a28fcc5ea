//! # CreatorSync Library
//!
//! Core functionality for the CreatorSync service: the sync orchestration
//! engine (scheduler, queue worker, per-account coordinator, session
//! notifier), the provider SDK, and the HTTP surface.

pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod handlers;
pub mod media;
pub mod models;
pub mod notifier;
pub mod providers;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
pub mod test_support;

pub use migration;
