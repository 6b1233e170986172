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
    input::AnthropicRequest,
    output::{AnthropicResponse, AnthropicStreamEvent},
};

use crate::{
    error::LlmError,
    messages::{
        ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatRole, ChunkChoice,
        ChunkDelta, FinishReason, Model, ObjectType, Usage, unix_timestamp,
    },
    provider::{
        CHAT_COMPLETION_TIMEOUT, ChatCompletionStream, Provider, request_error, upstream_error,
    },
};

const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Adapter for the Anthropic Messages API.
pub(crate) struct AnthropicProvider {
    client: Client,
    base_url: String,
    name: String,
    streaming: bool,
}

impl AnthropicProvider {
    pub fn new(name: String, config: config::AnthropicConfig) -> crate::Result<Self> {
        let client = Client::builder().build().map_err(|e| {
            log::error!("Failed to create HTTP client for Anthropic provider: {e}");
            LlmError::Internal(None)
        })?;

        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_ANTHROPIC_API_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            name,
            streaming: config.streaming,
        })
    }

    fn messages_request(&self, body: &AnthropicRequest, api_key: &SecretString) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/v1/messages", self.base_url))
            .timeout(CHAT_COMPLETION_TIMEOUT)
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
        api_key: &SecretString,
    ) -> crate::Result<ChatCompletionResponse> {
        let anthropic_request = AnthropicRequest::from(request);

        let response = self
            .messages_request(&anthropic_request, api_key)
            .send()
            .await
            .map_err(|e| request_error("Anthropic", e))?;

        if !response.status().is_success() {
            return Err(upstream_error("Anthropic", response).await);
        }

        let response_text = response.text().await.map_err(|e| {
            log::error!("Failed to read Anthropic response body: {e}");
            LlmError::Internal(None)
        })?;

        let anthropic_response: AnthropicResponse = serde_json::from_str(&response_text).map_err(|e| {
            log::error!("Failed to parse Anthropic chat completion response: {e}");
            log::error!("Raw response that failed to parse: {response_text}");
            LlmError::Internal(None)
        })?;

        Ok(anthropic_response.into())
    }

    async fn chat_completion_stream(
        &self,
        request: ChatCompletionRequest,
        api_key: &SecretString,
    ) -> crate::Result<ChatCompletionStream> {
        let model = request.model.clone();

        let mut anthropic_request = AnthropicRequest::from(request);
        anthropic_request.stream = true;

        let response = self
            .messages_request(&anthropic_request, api_key)
            .send()
            .await
            .map_err(|e| request_error("Anthropic", e))?;

        if !response.status().is_success() {
            return Err(upstream_error("Anthropic", response).await);
        }

        // One stable id for every chunk of this stream.
        let chunk_id = format!("chatcmpl-{}", Uuid::new_v4());
        let created = unix_timestamp();

        let stream = try_stream! {
            let mut events = response.bytes_stream().eventsource();

            // The upstream reports the stop reason in message_delta and
            // again at message_stop; only one finish chunk may go out.
            let mut finish_sent = false;
            let mut pending_usage: Option<Usage> = None;

            while let Some(event) = events.next().await {
                let event = event.map_err(|e| {
                    LlmError::Connection(format!("Anthropic stream error: {e}"))
                })?;

                if event.data.is_empty() {
                    continue;
                }

                let Ok(parsed) = serde_json::from_str::<AnthropicStreamEvent>(&event.data) else {
                    log::warn!("Failed to parse Anthropic stream event, skipping frame");
                    continue;
                };

                match parsed {
                    AnthropicStreamEvent::MessageStart => {
                        yield chunk(
                            &chunk_id,
                            created,
                            &model,
                            ChunkDelta {
                                role: Some(ChatRole::Assistant),
                                ..Default::default()
                            },
                            None,
                            None,
                        );
                    }
                    AnthropicStreamEvent::ContentBlockDelta { delta } => {
                        if delta.r#type != "text_delta" {
                            continue;
                        }

                        let Some(text) = delta.text else { continue };

                        yield chunk(
                            &chunk_id,
                            created,
                            &model,
                            ChunkDelta {
                                content: Some(text),
                                ..Default::default()
                            },
                            None,
                            None,
                        );
                    }
                    AnthropicStreamEvent::MessageDelta { delta, usage } => {
                        pending_usage = usage.map(Into::into);

                        if let Some(stop_reason) = delta.stop_reason {
                            yield chunk(
                                &chunk_id,
                                created,
                                &model,
                                ChunkDelta::default(),
                                Some(stop_reason.into()),
                                None,
                            );

                            finish_sent = true;
                        }
                    }
                    AnthropicStreamEvent::MessageStop { usage } => {
                        let usage = usage.map(Into::into).or(pending_usage.take());

                        if !finish_sent {
                            yield chunk(
                                &chunk_id,
                                created,
                                &model,
                                ChunkDelta::default(),
                                Some(FinishReason::Stop),
                                usage,
                            );
                        } else if usage.is_some() {
                            // Usage-only trailer after the finish chunk.
                            yield ChatCompletionChunk {
                                id: chunk_id.clone(),
                                object: ObjectType::ChatCompletionChunk,
                                created,
                                model: model.clone(),
                                choices: Vec::new(),
                                usage,
                            };
                        }

                        break;
                    }
                    AnthropicStreamEvent::Other => {}
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn list_models(&self, _api_key: &SecretString) -> crate::Result<Vec<Model>> {
        // The upstream has no list endpoint; serve the known inventory.
        let inventory = [
            ("claude-3-5-sonnet-20241022", 1729555200),
            ("claude-3-5-sonnet-20240620", 1718841600),
            ("claude-3-5-haiku-20241022", 1729555200),
            ("claude-3-opus-20240229", 1709251200),
            ("claude-3-sonnet-20240229", 1709251200),
            ("claude-3-haiku-20240307", 1709769600),
            ("claude-3-5-sonnet-latest", 1729555200),
            ("claude-3-5-haiku-latest", 1729555200),
            ("claude-3-opus-latest", 1709251200),
        ];

        Ok(inventory
            .into_iter()
            .map(|(id, created)| Model {
                id: id.to_string(),
                object: ObjectType::Model,
                created,
                owned_by: "anthropic".to_string(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "anthropic"
    }
}

fn chunk(
    id: &str,
    created: u64,
    model: &str,
    delta: ChunkDelta,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: ObjectType::ChatCompletionChunk,
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
        usage,
    }
}
