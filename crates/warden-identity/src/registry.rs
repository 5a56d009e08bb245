//! Provider Registry - factories and the live set of configured providers
//!
//! The registry provides:
//! - Factory registration by provider type
//! - Building providers from configurations and swapping them in
//! - O(1) lookup of providers and configurations by name
//!
//! Both name-keyed maps sit behind one lock so a reader never observes a
//! provider without its configuration or the other way around.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use warden_core::{Configuration, IdentityProvider, ProviderFactory, Result, WardenError};

#[derive(Default)]
struct ActiveProviders {
    providers: HashMap<String, IdentityProvider>,
    configurations: HashMap<String, Configuration>,
}

/// Registry of identity provider factories and active providers
#[derive(Default)]
pub struct ProviderRegistry {
    factories: RwLock<HashMap<&'static str, Arc<dyn ProviderFactory>>>,
    active: RwLock<ActiveProviders>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the factories shipped in `crate::providers`
    pub async fn with_builtin_factories() -> Result<Self> {
        let registry = Self::new();
        for factory in crate::providers::builtin_factories() {
            registry.register_factory(factory).await?;
        }
        Ok(registry)
    }

    /// Register a factory; its type string must be unique
    pub async fn register_factory(&self, factory: Arc<dyn ProviderFactory>) -> Result<()> {
        let provider_type = factory.provider_type();
        let mut factories = self.factories.write().await;
        if factories.contains_key(provider_type) {
            return Err(WardenError::config_error(format!(
                "Identity provider factory {} is already registered",
                provider_type
            )));
        }
        debug!("Registered identity provider factory {}", provider_type);
        factories.insert(provider_type, factory);
        Ok(())
    }

    pub async fn factory_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.factories.read().await.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Build the provider for `config` and make it active under its name,
    /// replacing any previous provider of that name.
    ///
    /// On failure the previous entry, if any, is left untouched.
    #[instrument(skip(self, config), fields(provider = %config.name, provider_type = %config.provider_type))]
    pub async fn apply(&self, config: Configuration) -> Result<()> {
        let factory = self
            .factories
            .read()
            .await
            .get(config.provider_type.as_str())
            .cloned()
            .ok_or_else(|| WardenError::UnsupportedProviderType {
                provider_type: config.provider_type.clone(),
            })?;

        // Build outside the lock; factories may do I/O
        let provider = factory.create(&config.provider).await?;

        let mut active = self.active.write().await;
        active.providers.insert(config.name.clone(), provider);
        active.configurations.insert(config.name.clone(), config);
        info!("Identity provider is active");
        Ok(())
    }

    /// Deactivate the provider of that name; returns whether it was active
    #[instrument(skip(self))]
    pub async fn remove(&self, name: &str) -> bool {
        let mut active = self.active.write().await;
        let had_provider = active.providers.remove(name).is_some();
        let had_config = active.configurations.remove(name).is_some();
        if had_provider || had_config {
            info!("Identity provider removed");
        }
        had_provider || had_config
    }

    /// Keep only the providers named in `names`
    pub async fn retain(&self, names: &[String]) {
        let mut active = self.active.write().await;
        active.providers.retain(|name, _| names.contains(name));
        active.configurations.retain(|name, _| names.contains(name));
    }

    pub async fn get_provider(&self, name: &str) -> Result<IdentityProvider> {
        self.active
            .read()
            .await
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| WardenError::provider_not_found(name))
    }

    pub async fn get_configuration(&self, name: &str) -> Result<Configuration> {
        self.active
            .read()
            .await
            .configurations
            .get(name)
            .cloned()
            .ok_or_else(|| WardenError::configuration_not_found(name))
    }

    /// Configuration and provider of one name, read under a single lock
    pub async fn get(&self, name: &str) -> Result<(Configuration, IdentityProvider)> {
        let active = self.active.read().await;
        let config = active
            .configurations
            .get(name)
            .cloned()
            .ok_or_else(|| WardenError::configuration_not_found(name))?;
        let provider = active
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| WardenError::provider_not_found(name))?;
        Ok((config, provider))
    }

    pub async fn configurations(&self) -> Vec<Configuration> {
        let mut configs: Vec<_> = self
            .active
            .read()
            .await
            .configurations
            .values()
            .cloned()
            .collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        configs
    }
}
