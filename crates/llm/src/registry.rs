//! Provider registry and model routing table.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

use crate::provider::Provider;

/// A resolved route: which provider serves a model, and the model id the
/// upstream actually understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ModelRoute {
    pub provider: String,
    pub upstream_model: String,
}

/// Registry of providers and the lazily populated model routing table.
///
/// Routes are cached as `provider/model` prefixed identifiers when the
/// model list is aggregated, which disambiguates colliding model names
/// across providers without a static manifest.
#[derive(Default)]
pub(crate) struct Registry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    providers: HashMap<String, Arc<dyn Provider>>,
    routes: HashMap<String, ModelRoute>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Idempotent by name, last write wins.
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.providers.insert(name.into(), provider);
    }

    /// Get a provider by name.
    pub fn provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.providers.get(name).cloned()
    }

    /// All registered providers with their names.
    pub fn providers(&self) -> Vec<(String, Arc<dyn Provider>)> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .providers
            .iter()
            .map(|(name, provider)| (name.clone(), Arc::clone(provider)))
            .collect()
    }

    /// Cache a route from a prefixed model id to its provider and upstream
    /// model id. Idempotent.
    pub fn cache_model(
        &self,
        prefixed_id: impl Into<String>,
        provider: impl Into<String>,
        upstream_model: impl Into<String>,
    ) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.routes.insert(
            prefixed_id.into(),
            ModelRoute {
                provider: provider.into(),
                upstream_model: upstream_model.into(),
            },
        );
    }

    /// Resolve a model identifier to a provider and upstream model id.
    ///
    /// A cached prefixed id wins; otherwise an unprefixed id resolves when
    /// exactly one provider is registered (legacy single-provider
    /// passthrough, with the id forwarded unchanged).
    pub fn route(&self, model: &str) -> Option<ModelRoute> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());

        if let Some(route) = inner.routes.get(model) {
            if inner.providers.contains_key(&route.provider) {
                return Some(route.clone());
            }
        }

        if inner.providers.len() == 1 {
            let provider = inner.providers.keys().next().expect("one provider");

            return Some(ModelRoute {
                provider: provider.clone(),
                upstream_model: model.to_string(),
            });
        }

        None
    }

    /// Names of all registered providers.
    pub fn list_providers(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = inner.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// A snapshot of the routing table, for diagnostics.
    #[allow(dead_code)]
    pub fn model_cache(&self) -> BTreeMap<String, ModelRoute> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .routes
            .iter()
            .map(|(id, route)| (id.clone(), route.clone()))
            .collect()
    }
}
