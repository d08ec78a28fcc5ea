//! Provider registry
//!
//! Instance-scoped registry mapping platform slugs to provider
//! implementations. Built once at startup and injected into the components
//! that dispatch provider calls.

use std::collections::HashMap;
use std::sync::Arc;

use crate::providers::trait_::PlatformProvider;

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("platform '{platform}' has no registered provider")]
    PlatformNotFound { platform: String },
}

/// Registry of platform providers keyed by slug
#[derive(Clone, Default)]
pub struct Registry {
    providers: HashMap<String, Arc<dyn PlatformProvider>>,
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under its platform slug, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn PlatformProvider>) {
        self.providers
            .insert(provider.platform().to_string(), provider);
    }

    /// Look up the provider for a platform slug.
    pub fn get(&self, platform: &str) -> Result<Arc<dyn PlatformProvider>, RegistryError> {
        self.providers
            .get(platform)
            .cloned()
            .ok_or_else(|| RegistryError::PlatformNotFound {
                platform: platform.to_string(),
            })
    }

    /// Registered platform slugs, for the service info endpoint.
    pub fn platforms(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.providers.keys().cloned().collect();
        slugs.sort();
        slugs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::fixture::FixtureProvider;

    #[test]
    fn lookup_after_register() {
        let mut registry = Registry::new();
        registry.register(Arc::new(FixtureProvider::empty("tiktok")));

        assert!(registry.get("tiktok").is_ok());
        assert!(matches!(
            registry.get("youtube"),
            Err(RegistryError::PlatformNotFound { .. })
        ));
        assert_eq!(registry.platforms(), vec!["tiktok".to_string()]);
    }
}
