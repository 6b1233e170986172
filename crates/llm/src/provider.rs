pub(crate) mod anthropic;
pub(crate) mod google;
mod images;
pub(crate) mod openai;

use std::{pin::Pin, time::Duration};

use async_trait::async_trait;
use futures::Stream;
use secrecy::SecretString;

use crate::{
    error::LlmError,
    messages::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, Model},
};

/// Type alias for a stream of chat completion chunks.
///
/// A lazy, finite sequence of canonical chunks. Errors travel in-band as the
/// stream's one-shot failure signal; dropping the stream cancels the
/// underlying upstream request.
pub(crate) type ChatCompletionStream = Pin<Box<dyn Stream<Item = crate::Result<ChatCompletionChunk>> + Send>>;

/// Request-scoped timeout for chat completion calls, streaming included.
pub(crate) const CHAT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);

/// Request-scoped timeout for model list calls.
pub(crate) const LIST_MODELS_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for upstream provider adapters.
///
/// Adapters are stateless with respect to per-request data and safe for
/// concurrent use; the credential for each call is passed in by the caller.
///
/// Note for async_trait: the trait must be dyn-compatible, so plain Rust
/// async trait functions are not enough here.
#[async_trait]
pub(crate) trait Provider: Send + Sync {
    /// Process a chat completion request against the upstream.
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
        api_key: &SecretString,
    ) -> crate::Result<ChatCompletionResponse>;

    /// Process a streaming chat completion request.
    ///
    /// Returns a stream of canonical chunks emitted as the upstream
    /// produces them. The default implementation rejects streaming.
    async fn chat_completion_stream(
        &self,
        _request: ChatCompletionRequest,
        _api_key: &SecretString,
    ) -> crate::Result<ChatCompletionStream> {
        Err(LlmError::StreamingNotSupported)
    }

    /// Whether the upstream can stream. The pipeline consults this before
    /// attempting a streaming call and may fall back to a synthetic stream.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// List the models available from this provider.
    async fn list_models(&self, api_key: &SecretString) -> crate::Result<Vec<Model>>;

    /// The configured provider name.
    fn name(&self) -> &str;

    /// The upstream dialect: "openai", "anthropic" or "google".
    fn kind(&self) -> &'static str;
}

/// Map a transport-level reqwest failure onto the gateway error model.
pub(crate) fn request_error(provider: &str, error: reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout(format!("request to {provider} timed out"))
    } else {
        LlmError::Connection(format!("Failed to send request to {provider}: {error}"))
    }
}

/// Drain a non-success upstream response into an error, logging the body.
pub(crate) async fn upstream_error(provider: &str, response: reqwest::Response) -> LlmError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    log::error!("{provider} API error ({status}): {body}");

    LlmError::upstream(status.as_u16(), body)
}
