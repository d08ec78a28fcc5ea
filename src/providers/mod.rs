//! Platform providers
//!
//! This module defines the provider SDK:
//! - The `PlatformProvider` trait every scraper implementation follows
//! - The instance-scoped registry mapping platform slugs to providers
//! - A scripted fixture provider used by tests and local profiles

pub mod fixture;
pub mod registry;
pub mod trait_;

pub use fixture::FixtureProvider;
pub use registry::{Registry, RegistryError};
pub use trait_::{PlatformProvider, ProviderError, ProviderItem};
