//! Explicit provider registry
//!
//! The composition root builds one registry at startup, registers the
//! adapters it links against, and hands it to whatever drives
//! reconciliation. Nothing registers itself behind the caller's back.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zonesync_core::registry::ProviderRegistry;
//!
//! let mut registry = ProviderRegistry::new();
//! zonesync_core::providers::register(&mut registry);
//! zonesync_provider_cloudflare::register(&mut registry);
//!
//! let providers = registry.build_providers(&config.providers)?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory};

/// Maps provider type names to factories
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn DnsProviderFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory under its type name
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_provider(
        &mut self,
        name: impl Into<String>,
        factory: Box<dyn DnsProviderFactory>,
    ) {
        let name = name.into();
        debug!("Registering provider type '{}'", name);
        self.providers.insert(name, factory);
    }

    /// Create a DNS provider from configuration
    ///
    /// Fails with a configuration error if the type is not registered or
    /// the factory rejects the configuration.
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();
        let factory = self
            .providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Instantiate every named provider block
    pub fn build_providers(
        &self,
        configs: &BTreeMap<String, ProviderConfig>,
    ) -> Result<BTreeMap<String, Arc<dyn DnsProvider>>> {
        configs
            .iter()
            .map(|(name, config)| {
                let provider = self.create_provider(config).map_err(|e| {
                    Error::config(format!("provider '{}': {}", name, e))
                })?;
                Ok((name.clone(), Arc::from(provider)))
            })
            .collect()
    }

    /// List all registered provider types, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MemoryFactory;

    struct FailingFactory;

    impl DnsProviderFactory for FailingFactory {
        fn create(&self, _config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
            Err(Error::not_found("Mock provider not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let mut registry = ProviderRegistry::new();
        assert!(!registry.has_provider("mock"));

        registry.register_provider("mock", Box::new(FailingFactory));

        assert!(registry.has_provider("mock"));
        assert_eq!(registry.list_providers(), vec!["mock".to_string()]);
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        let registry = ProviderRegistry::new();
        let err = registry
            .create_provider(&ProviderConfig::Memory)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_build_providers_names_each_instance() {
        let mut registry = ProviderRegistry::new();
        registry.register_provider("memory", Box::new(MemoryFactory));

        let configs = BTreeMap::from([
            ("primary".to_string(), ProviderConfig::Memory),
            ("secondary".to_string(), ProviderConfig::Memory),
        ]);
        let built = registry.build_providers(&configs).unwrap();
        assert_eq!(built.len(), 2);
        assert_eq!(built["primary"].provider_name(), "memory");
    }

    #[test]
    fn test_build_providers_reports_failing_block() {
        let mut registry = ProviderRegistry::new();
        registry.register_provider("memory", Box::new(FailingFactory));

        let configs = BTreeMap::from([("broken".to_string(), ProviderConfig::Memory)]);
        let err = registry.build_providers(&configs).err().unwrap();
        assert!(err.to_string().contains("broken"));
    }
}
