//! Provider registry and the factory table that populates it.
//!
//! Providers are constructed once at startup from configuration and shared
//! read-only by every build afterwards.

use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::{CredentialProvider, Error, Result, SourceProvider};

/// A provider block from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Logical name used by repositories and actions.
    pub name: String,
    /// Type discriminator selecting the factory, e.g. `"github"`.
    pub kind: String,
    /// Provider-specific settings.
    pub settings: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// A setting that must be present and non-empty.
    pub fn required(&self, key: &str) -> Result<&str> {
        match self.setting(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(Error::InvalidInput(format!(
                "provider {:?} ({}) requires setting {:?}",
                self.name, self.kind, key
            ))),
        }
    }
}

/// Process-wide values available to every factory.
#[derive(Debug, Clone, Default)]
pub struct FactoryContext {
    /// Public base URL of this server; provider endpoints hang off it.
    pub webhook_url: String,
}

type Factory<T> =
    Arc<dyn Fn(ProviderConfig, FactoryContext) -> BoxFuture<'static, Result<Arc<T>>> + Send + Sync>;

/// Named provider instances, looked up at call time.
#[derive(Default)]
pub struct ProviderRegistry {
    sources: HashMap<String, Arc<dyn SourceProvider>>,
    credentials: HashMap<String, Arc<dyn CredentialProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_source(&mut self, name: impl Into<String>, provider: Arc<dyn SourceProvider>) {
        self.sources.insert(name.into(), provider);
    }

    pub fn register_credentials(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn CredentialProvider>,
    ) {
        self.credentials.insert(name.into(), provider);
    }

    pub fn source(&self, name: &str) -> Result<Arc<dyn SourceProvider>> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("source provider {name:?}")))
    }

    pub fn credentials(&self, name: &str) -> Result<Arc<dyn CredentialProvider>> {
        self.credentials
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("credential provider {name:?}")))
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn credential_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.credentials.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("sources", &self.source_names())
            .field("credentials", &self.credential_names())
            .finish()
    }
}

/// Constructors keyed by provider type.
///
/// New backends are added by registering a factory; [`ProviderFactories::build`]
/// dispatches on the `type` of each configured block.
#[derive(Default, Clone)]
pub struct ProviderFactories {
    sources: BTreeMap<String, Factory<dyn SourceProvider>>,
    credentials: BTreeMap<String, Factory<dyn CredentialProvider>>,
}

impl ProviderFactories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_source<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(ProviderConfig, FactoryContext) -> BoxFuture<'static, Result<Arc<dyn SourceProvider>>>
            + Send
            + Sync
            + 'static,
    {
        self.sources.insert(kind.into(), Arc::new(factory));
    }

    pub fn register_credentials<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(
                ProviderConfig,
                FactoryContext,
            ) -> BoxFuture<'static, Result<Arc<dyn CredentialProvider>>>
            + Send
            + Sync
            + 'static,
    {
        self.credentials.insert(kind.into(), Arc::new(factory));
    }

    pub fn source_kinds(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn credential_kinds(&self) -> impl Iterator<Item = &str> {
        self.credentials.keys().map(String::as_str)
    }

    /// Construct every configured provider.
    ///
    /// Fails on the first unknown type or constructor error.
    pub async fn build(
        &self,
        sources: &[ProviderConfig],
        credentials: &[ProviderConfig],
        ctx: &FactoryContext,
    ) -> Result<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();

        for config in sources {
            let factory = self.sources.get(&config.kind).ok_or_else(|| {
                Error::Provider(format!(
                    "unknown source provider type {:?} for {:?}",
                    config.kind, config.name
                ))
            })?;
            let name = config.name.clone();
            let provider = factory(config.clone(), ctx.clone())
                .await
                .map_err(|e| Error::Provider(format!("source provider {name:?}: {e}")))?;
            registry.register_source(name, provider);
        }

        for config in credentials {
            let factory = self.credentials.get(&config.kind).ok_or_else(|| {
                Error::Provider(format!(
                    "unknown credential provider type {:?} for {:?}",
                    config.kind, config.name
                ))
            })?;
            let name = config.name.clone();
            let provider = factory(config.clone(), ctx.clone())
                .await
                .map_err(|e| Error::Provider(format!("credential provider {name:?}: {e}")))?;
            registry.register_credentials(name, provider);
        }

        Ok(registry)
    }
}
