use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{
    error::LlmError,
    messages::{
        ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, Model, ObjectType,
    },
    provider::{
        CHAT_COMPLETION_TIMEOUT, ChatCompletionStream, LIST_MODELS_TIMEOUT, Provider,
        request_error, upstream_error,
    },
};

const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Adapter for OpenAI-shaped upstreams.
///
/// The canonical wire format is the OpenAI format, so request and response
/// translation is the identity transform.
pub(crate) struct OpenAiProvider {
    client: Client,
    base_url: String,
    name: String,
    streaming: bool,
}

impl OpenAiProvider {
    pub fn new(name: String, config: config::OpenAiConfig) -> crate::Result<Self> {
        let client = Client::builder().build().map_err(|e| {
            log::error!("Failed to create HTTP client for OpenAI provider: {e}");
            LlmError::Internal(None)
        })?;

        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_API_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            name,
            streaming: config.streaming,
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn chat_completion(
        &self,
        mut request: ChatCompletionRequest,
        api_key: &SecretString,
    ) -> crate::Result<ChatCompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        request.stream = Some(false);

        let response = self
            .client
            .post(&url)
            .timeout(CHAT_COMPLETION_TIMEOUT)
            .header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()))
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error("OpenAI", e))?;

        if !response.status().is_success() {
            return Err(upstream_error("OpenAI", response).await);
        }

        let response_text = response.text().await.map_err(|e| {
            log::error!("Failed to read OpenAI response body: {e}");
            LlmError::Internal(None)
        })?;

        sonic_rs::from_str(&response_text).map_err(|e| {
            log::error!("Failed to parse OpenAI chat completion response: {e}");
            log::error!("Raw response that failed to parse: {response_text}");
            LlmError::Internal(None)
        })
    }

    async fn chat_completion_stream(
        &self,
        mut request: ChatCompletionRequest,
        api_key: &SecretString,
    ) -> crate::Result<ChatCompletionStream> {
        let url = format!("{}/chat/completions", self.base_url);

        request.stream = Some(true);

        let response = self
            .client
            .post(&url)
            .timeout(CHAT_COMPLETION_TIMEOUT)
            .header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()))
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error("OpenAI", e))?;

        if !response.status().is_success() {
            return Err(upstream_error("OpenAI", response).await);
        }

        let stream = try_stream! {
            let mut events = response.bytes_stream().eventsource();

            while let Some(event) = events.next().await {
                let event = event.map_err(|e| {
                    LlmError::Connection(format!("OpenAI stream error: {e}"))
                })?;

                if event.data == "[DONE]" {
                    break;
                }

                // Chunks are already canonical; forward them unchanged.
                let Ok(chunk) = sonic_rs::from_str::<ChatCompletionChunk>(&event.data) else {
                    log::warn!("Failed to parse OpenAI streaming chunk, skipping frame");
                    continue;
                };

                yield chunk;
            }
        };

        Ok(Box::pin(stream))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn list_models(&self, api_key: &SecretString) -> crate::Result<Vec<Model>> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(LIST_MODELS_TIMEOUT)
            .header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()))
            .send()
            .await
            .map_err(|e| request_error("OpenAI", e))?;

        if !response.status().is_success() {
            return Err(upstream_error("OpenAI", response).await);
        }

        let response_text = response.text().await.map_err(|e| {
            log::error!("Failed to read OpenAI models response body: {e}");
            LlmError::Internal(None)
        })?;

        let models_response: OpenAiModelsResponse = sonic_rs::from_str(&response_text).map_err(|e| {
            log::error!("Failed to parse OpenAI models list response: {e}");
            log::error!("Raw response that failed to parse: {response_text}");
            LlmError::Internal(None)
        })?;

        Ok(models_response.data.into_iter().map(Into::into).collect())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "openai"
    }
}

/// Response from the OpenAI models list endpoint.
#[derive(Debug, Deserialize)]
struct OpenAiModelsResponse {
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
    #[serde(default)]
    created: u64,
    #[serde(default)]
    owned_by: String,
}

impl From<OpenAiModel> for Model {
    fn from(model: OpenAiModel) -> Self {
        Self {
            id: model.id,
            object: ObjectType::Model,
            created: model.created,
            owned_by: model.owned_by,
        }
    }
}
