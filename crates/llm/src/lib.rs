//! OpenAI-compatible LLM gateway core.
//!
//! One HTTP surface in front of heterogeneous upstream providers: requests
//! are routed by model identifier, a credential is selected from the
//! provider's pool, and the request is translated into the upstream's
//! native protocol. Responses, streaming included, come back out in the
//! OpenAI Chat Completions wire shape.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use messages::ChatCompletionRequest;

mod error;
mod messages;
mod provider;
mod registry;
mod rotation;
mod server;
mod sse;

pub use error::{ErrorResponse, LlmError};
pub use rotation::ProviderKeyStats;
use server::LlmServer;

pub type Result<T> = std::result::Result<T, LlmError>;

/// The assembled gateway core: registry, credential pools and adapters.
#[derive(Clone)]
pub struct Gateway {
    server: Arc<LlmServer>,
}

impl Gateway {
    /// Build the gateway from configuration. Fails when no provider can be
    /// initialized.
    pub fn new(config: &config::Config) -> anyhow::Result<Self> {
        let server = LlmServer::new(&config.llm)
            .map_err(|e| anyhow::anyhow!("Failed to initialize LLM gateway: {e}"))?;

        Ok(Self {
            server: Arc::new(server),
        })
    }

    /// The OpenAI-compatible API surface. Callers put this behind their
    /// authentication middleware.
    pub fn api_router(&self) -> Router {
        Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .route("/v1/models", get(list_models))
            // Wildcard capture: prefixed identifiers contain a slash.
            .route("/v1/models/{*model}", get(get_model))
            .with_state(Arc::clone(&self.server))
    }

    /// Operational endpoints, served without authentication.
    pub fn ops_router(&self) -> Router {
        Router::new()
            .route("/stats", get(stats))
            .with_state(Arc::clone(&self.server))
    }
}

/// Handle chat completion requests.
///
/// Supports both streaming and non-streaming responses. With `stream: true`
/// the response is sent as Server-Sent Events, otherwise as a single JSON
/// document.
async fn chat_completions(
    State(server): State<Arc<LlmServer>>,
    request: std::result::Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = request?;

    if request.messages.is_empty() {
        return Err(LlmError::InvalidRequest(
            "messages must contain at least one entry".to_string(),
        ));
    }

    log::info!("Chat completion requested for model: {}", request.model);
    log::debug!(
        "Request has {} messages, streaming: {}",
        request.messages.len(),
        request.stream.unwrap_or(false)
    );

    if request.stream.unwrap_or(false) {
        let stream = server.completions_stream(request).await?;
        Ok(sse::sse_response(stream))
    } else {
        let response = server.completions(request).await?;

        log::debug!(
            "Chat completion successful, returning response with {} choices",
            response.choices.len()
        );

        Ok(Json(response).into_response())
    }
}

/// Aggregate model lists from all providers under prefixed identifiers.
async fn list_models(State(server): State<Arc<LlmServer>>) -> Response {
    let response = server.models().await;

    log::debug!("Returning {} models", response.data.len());

    Json(response).into_response()
}

/// Echo a single model if the routing table knows it.
async fn get_model(
    State(server): State<Arc<LlmServer>>,
    Path(model): Path<String>,
) -> Result<Response> {
    let model = server.model(&model)?;
    Ok(Json(model).into_response())
}

/// Masked per-key usage counters, for operators.
async fn stats(State(server): State<Arc<LlmServer>>) -> Response {
    Json(server.stats()).into_response()
}
