//! The request pipeline: route, select a credential, dispatch to the
//! adapter, and restore the client-facing model identifier.

use std::{collections::BTreeMap, sync::Arc};

use config::{LlmConfig, LlmProviderConfig};
use futures::StreamExt;
use itertools::Itertools;
use secrecy::{ExposeSecret, SecretString};

use crate::{
    error::LlmError,
    messages::{ChatCompletionRequest, ChatCompletionResponse, Model, ModelsResponse, ObjectType},
    provider::{
        ChatCompletionStream, Provider, anthropic::AnthropicProvider, google::GoogleProvider,
        openai::OpenAiProvider,
    },
    registry::Registry,
    rotation::{KeyPool, KeyRing, ProviderKeyStats, mask_key},
    sse,
};

#[derive(Clone)]
pub(crate) struct LlmServer {
    shared: Arc<LlmServerInner>,
}

struct LlmServerInner {
    registry: Registry,
    keys: KeyRing,
    synthetic_streaming: bool,
}

impl LlmServer {
    pub fn new(config: &LlmConfig) -> crate::Result<Self> {
        log::debug!("Initializing LLM server with {} providers", config.providers.len());

        let registry = Registry::new();
        let mut keys = KeyRing::new();

        for (name, provider_config) in &config.providers {
            log::debug!("Initializing provider: {name}");

            let provider: Arc<dyn Provider> = match provider_config {
                LlmProviderConfig::Openai(api_config) => {
                    Arc::new(OpenAiProvider::new(name.clone(), api_config.clone())?)
                }
                LlmProviderConfig::Anthropic(api_config) => {
                    Arc::new(AnthropicProvider::new(name.clone(), api_config.clone())?)
                }
                LlmProviderConfig::Google(api_config) => {
                    Arc::new(GoogleProvider::new(name.clone(), api_config.clone())?)
                }
            };

            registry.register(name.clone(), provider);
            keys.insert(
                name.clone(),
                KeyPool::new(provider_config.api_keys().to_vec(), provider_config.rotation_strategy()),
            );
        }

        if registry.list_providers().is_empty() {
            return Err(LlmError::Internal(Some(
                "Failed to initialize any LLM providers.".to_string(),
            )));
        }

        log::debug!(
            "LLM server initialized with {} active provider(s)",
            registry.list_providers().len()
        );

        Ok(Self {
            shared: Arc::new(LlmServerInner {
                registry,
                keys,
                synthetic_streaming: config.synthetic_streaming,
            }),
        })
    }

    /// Process a non-streaming chat completion request.
    pub async fn completions(
        &self,
        mut request: ChatCompletionRequest,
    ) -> crate::Result<ChatCompletionResponse> {
        let (provider, key, original_model) = self.prepare(&mut request)?;

        let mut response = provider.chat_completion(request, &key).await?;

        // The client sees the identifier it asked for, never the
        // upstream-rewritten one.
        response.model = original_model;

        Ok(response)
    }

    /// Process a streaming chat completion request.
    ///
    /// When the upstream cannot stream and synthetic streaming is enabled,
    /// the returned stream is fabricated from a single upstream response.
    pub async fn completions_stream(
        &self,
        mut request: ChatCompletionRequest,
    ) -> crate::Result<ChatCompletionStream> {
        let (provider, key, original_model) = self.prepare(&mut request)?;

        if provider.supports_streaming() {
            let stream = provider.chat_completion_stream(request, &key).await?;

            let restored = stream.map(move |chunk_result| {
                chunk_result.map(|mut chunk| {
                    chunk.model = original_model.clone();
                    chunk
                })
            });

            return Ok(Box::pin(restored));
        }

        if !self.shared.synthetic_streaming {
            log::debug!("Provider '{}' does not support streaming", provider.name());
            return Err(LlmError::StreamingNotSupported);
        }

        log::debug!(
            "Provider '{}' does not support streaming, synthesizing SSE from a single response",
            provider.name()
        );

        let mut response = provider.chat_completion(request, &key).await?;
        response.model = original_model;

        Ok(sse::synthetic_stream(response))
    }

    /// Aggregate the model lists of all providers, concurrently.
    ///
    /// Every returned entry is re-emitted under its provider-prefixed
    /// identifier and cached in the routing table. A failing provider is
    /// logged and skipped; partial results are never fatal.
    pub async fn models(&self) -> ModelsResponse {
        let providers = self.shared.registry.providers();

        let lists = providers.into_iter().map(|(name, provider)| {
            let registry = &self.shared.registry;
            let keys = &self.shared.keys;

            async move {
                let Some(key) = keys.select(&name) else {
                    log::warn!("No API keys configured for provider '{name}', skipping model list");
                    return Vec::new();
                };

                match provider.list_models(&key).await {
                    Ok(models) => models
                        .into_iter()
                        .map(|model| {
                            let prefixed = format!("{name}/{}", model.id);
                            registry.cache_model(prefixed.clone(), name.clone(), model.id);

                            Model {
                                id: prefixed,
                                object: model.object,
                                created: model.created,
                                owned_by: name.clone(),
                            }
                        })
                        .collect(),
                    Err(e) => {
                        log::error!("Failed to list models for provider '{name}': {e}");
                        Vec::new()
                    }
                }
            }
        });

        let data = futures::future::join_all(lists).await.into_iter().flatten().collect();

        ModelsResponse {
            object: ObjectType::List,
            data,
        }
    }

    /// Look up a single model identifier.
    pub fn model(&self, id: &str) -> crate::Result<Model> {
        let route = self
            .shared
            .registry
            .route(id)
            .ok_or_else(|| LlmError::ModelNotFound(id.to_string()))?;

        Ok(Model {
            id: id.to_string(),
            object: ObjectType::Model,
            created: 0,
            owned_by: route.provider,
        })
    }

    /// Masked credential usage counters per provider.
    pub fn stats(&self) -> BTreeMap<String, ProviderKeyStats> {
        self.shared.keys.stats()
    }

    /// Route the request, pick a credential and rewrite the model field to
    /// the upstream-native identifier. Returns the adapter, the selected
    /// key and the client-requested model id.
    fn prepare(
        &self,
        request: &mut ChatCompletionRequest,
    ) -> crate::Result<(Arc<dyn Provider>, SecretString, String)> {
        let registry = &self.shared.registry;

        let Some(route) = registry.route(&request.model) else {
            log::error!(
                "No route for model '{model}'. Available providers: [{providers}]",
                model = request.model,
                providers = registry.list_providers().iter().join(", ")
            );

            return Err(LlmError::ModelNotRouted(request.model.clone()));
        };

        let provider = registry
            .provider(&route.provider)
            .ok_or_else(|| LlmError::ModelNotRouted(request.model.clone()))?;

        let key = self
            .shared
            .keys
            .select(&route.provider)
            .ok_or_else(|| LlmError::NoCredentials(route.provider.clone()))?;

        log::debug!(
            "Routed model '{}' to provider '{}' using key {}",
            request.model,
            route.provider,
            mask_key(key.expose_secret())
        );

        let original_model = std::mem::replace(&mut request.model, route.upstream_model);

        Ok((provider, key, original_model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_provider_map_fails_startup() {
        let config = LlmConfig::default();
        assert!(LlmServer::new(&config).is_err());
    }
}
