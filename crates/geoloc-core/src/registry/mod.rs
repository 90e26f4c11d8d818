//! Plugin-based provider registry
//!
//! The registry maps provider type names to factories so the fallback chain
//! can be built from configuration instead of hard-coded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geoloc_core::{ProviderRegistry, ResolverConfig, Resolver};
//!
//! let registry = ProviderRegistry::new();
//! geoloc_provider_http::register(&registry);
//!
//! let resolver = Resolver::from_config(&ResolverConfig::default(), &registry)?;
//! ```

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{GeoProvider, GeoProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Registry of provider factories
///
/// ## Thread Safety
///
/// Interior mutability with RwLock allows concurrent reads and exclusive
/// writes, so registration can happen through a shared reference.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Box<dyn GeoProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory under `name`
    ///
    /// A later registration with the same name replaces the earlier one.
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn GeoProviderFactory>) {
        let name = name.into();
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers.insert(name, factory);
    }

    /// Create one provider from its configuration entry
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn GeoProvider>)`: Created provider instance
    /// - `Err(Error)`: If the type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn GeoProvider>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create the whole fallback chain, preserving order
    pub fn create_chain(&self, configs: &[ProviderConfig]) -> Result<Vec<Arc<dyn GeoProvider>>> {
        configs
            .iter()
            .map(|config| self.create_provider(config).map(Arc::from))
            .collect()
    }

    /// List all registered provider types, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }
}
