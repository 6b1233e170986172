mod input;
mod output;

use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use self::{
    input::GoogleGenerateRequest,
    output::{GoogleGenerateResponse, GoogleModelsResponse},
};

use crate::{
    error::LlmError,
    messages::{
        ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatRole, ChunkChoice,
        ChunkDelta, Model, ObjectType, unix_timestamp,
    },
    provider::{
        CHAT_COMPLETION_TIMEOUT, ChatCompletionStream, LIST_MODELS_TIMEOUT, Provider,
        request_error, upstream_error,
    },
};

const DEFAULT_GOOGLE_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Adapter for the Google Gemini generateContent API.
///
/// The upstream authenticates with the API key as a URL query parameter
/// rather than a header.
pub(crate) struct GoogleProvider {
    client: Client,
    base_url: String,
    name: String,
    streaming: bool,
}

impl GoogleProvider {
    pub fn new(name: String, config: config::GoogleConfig) -> crate::Result<Self> {
        let client = Client::builder().build().map_err(|e| {
            log::error!("Failed to create HTTP client for Google provider: {e}");
            LlmError::Internal(None)
        })?;

        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_GOOGLE_API_URL)
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
impl Provider for GoogleProvider {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
        api_key: &SecretString,
    ) -> crate::Result<ChatCompletionResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let google_request = GoogleGenerateRequest::from(request);

        let response = self
            .client
            .post(&url)
            .timeout(CHAT_COMPLETION_TIMEOUT)
            .query(&[("key", api_key.expose_secret())])
            .json(&google_request)
            .send()
            .await
            .map_err(|e| request_error("Google", e))?;

        if !response.status().is_success() {
            return Err(upstream_error("Google", response).await);
        }

        let response_text = response.text().await.map_err(|e| {
            log::error!("Failed to read Google response body: {e}");
            LlmError::Internal(None)
        })?;

        let google_response: GoogleGenerateResponse = serde_json::from_str(&response_text).map_err(|e| {
            log::error!("Failed to parse Google chat completion response: {e}");
            log::error!("Raw response that failed to parse: {response_text}");
            LlmError::Internal(None)
        })?;

        if google_response.candidates.is_empty() {
            log::error!("Google API returned an empty candidates array");
            return Err(LlmError::Internal(None));
        }

        Ok(google_response.into_response(format!("chatcmpl-{}", Uuid::new_v4())))
    }

    async fn chat_completion_stream(
        &self,
        request: ChatCompletionRequest,
        api_key: &SecretString,
    ) -> crate::Result<ChatCompletionStream> {
        let url = format!("{}/models/{}:streamGenerateContent", self.base_url, request.model);
        let model = request.model.clone();
        let google_request = GoogleGenerateRequest::from(request);

        let response = self
            .client
            .post(&url)
            .timeout(CHAT_COMPLETION_TIMEOUT)
            .query(&[("key", api_key.expose_secret()), ("alt", "sse")])
            .json(&google_request)
            .send()
            .await
            .map_err(|e| request_error("Google", e))?;

        if !response.status().is_success() {
            return Err(upstream_error("Google", response).await);
        }

        let chunk_id = format!("chatcmpl-{}", Uuid::new_v4());
        let created = unix_timestamp();

        let stream = try_stream! {
            // Single frames can be large JSON documents; the SSE decoder
            // buffers until the frame delimiter regardless of size.
            let mut events = response.bytes_stream().eventsource();
            let mut is_first = true;

            while let Some(event) = events.next().await {
                let event = event.map_err(|e| {
                    LlmError::Connection(format!("Google stream error: {e}"))
                })?;

                if event.data.is_empty() {
                    continue;
                }

                let Ok(frame) = serde_json::from_str::<GoogleGenerateResponse>(&event.data) else {
                    log::warn!("Failed to parse Google stream frame, skipping");
                    continue;
                };

                let Some(candidate) = frame.candidates.first() else {
                    continue;
                };

                let index = candidate.index;
                let terminal = candidate.is_terminal();
                let text = candidate.text();

                let delta = ChunkDelta {
                    role: is_first.then_some(ChatRole::Assistant),
                    content: Some(text),
                    tool_calls: None,
                };

                is_first = false;

                let finish_reason = if terminal {
                    frame.candidates.into_iter().next().and_then(|c| c.finish_reason).map(Into::into)
                } else {
                    None
                };

                yield ChatCompletionChunk {
                    id: chunk_id.clone(),
                    object: ObjectType::ChatCompletionChunk,
                    created,
                    model: model.clone(),
                    choices: vec![ChunkChoice {
                        index,
                        delta,
                        finish_reason,
                    }],
                    usage: frame.usage_metadata.map(Into::into),
                };

                if terminal {
                    break;
                }
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
            .query(&[("key", api_key.expose_secret())])
            .send()
            .await
            .map_err(|e| request_error("Google", e))?;

        if !response.status().is_success() {
            return Err(upstream_error("Google", response).await);
        }

        let response_text = response.text().await.map_err(|e| {
            log::error!("Failed to read Google models response body: {e}");
            LlmError::Internal(None)
        })?;

        let models_response: GoogleModelsResponse = serde_json::from_str(&response_text).map_err(|e| {
            log::error!("Failed to parse Google models list response: {e}");
            log::error!("Raw response that failed to parse: {response_text}");
            LlmError::Internal(None)
        })?;

        let created = unix_timestamp();

        let models = models_response
            .models
            .into_iter()
            .filter(|model| {
                model
                    .supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
            })
            .map(|model| Model {
                id: model
                    .name
                    .strip_prefix("models/")
                    .unwrap_or(&model.name)
                    .to_string(),
                object: ObjectType::Model,
                created,
                owned_by: "google".to_string(),
            })
            .collect();

        Ok(models)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "google"
    }
}
