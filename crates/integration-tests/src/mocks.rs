//! In-process mock upstream providers.
//!
//! Each mock is an axum server bound to an ephemeral loopback port,
//! recording the requests and credentials it receives so tests can assert
//! on the translated wire traffic.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};

#[derive(Default)]
struct MockState {
    chat_response: Value,
    error: Option<(u16, Value)>,
    stream_body: Option<String>,
    models_response: Value,
    requests: Mutex<Vec<Value>>,
    credentials: Mutex<Vec<String>>,
}

impl MockState {
    fn record(&self, body: Value, credential: Option<String>) {
        self.requests.lock().unwrap().push(body);

        if let Some(credential) = credential {
            self.credentials.lock().unwrap().push(credential);
        }
    }

    fn error_response(&self) -> Option<Response> {
        self.error.as_ref().map(|(status, body)| {
            (
                StatusCode::from_u16(*status).expect("valid status"),
                Json(body.clone()),
            )
                .into_response()
        })
    }

    fn sse_response(&self) -> Response {
        let body = self.stream_body.clone().unwrap_or_default();
        ([(CONTENT_TYPE, "text/event-stream")], body).into_response()
    }
}

/// A running mock upstream.
pub struct SpawnedMock {
    pub address: SocketAddr,
    state: Arc<MockState>,
}

impl SpawnedMock {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// The request bodies received, in order.
    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().unwrap().clone()
    }

    /// The credentials received, in order: `Authorization` header values,
    /// `x-api-key` values or `key` query parameters depending on the dialect.
    pub fn credentials(&self) -> Vec<String> {
        self.state.credentials.lock().unwrap().clone()
    }
}

async fn spawn(router: Router, state: Arc<MockState>) -> anyhow::Result<SpawnedMock> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock server crashed");
    });

    Ok(SpawnedMock { address, state })
}

/// Builder for an OpenAI-shaped upstream.
pub struct OpenAiMock {
    state: MockState,
}

impl Default for OpenAiMock {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiMock {
    pub fn new() -> Self {
        let state = MockState {
            chat_response: json!({
                "id": "chatcmpl-mock",
                "object": "chat.completion",
                "created": 1,
                "model": "gpt-4o",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "pong"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
            }),
            models_response: json!({
                "object": "list",
                "data": [
                    {"id": "gpt-4o", "object": "model", "created": 1715367049, "owned_by": "system"},
                    {"id": "gpt-4o-mini", "object": "model", "created": 1721172741, "owned_by": "system"}
                ]
            }),
            ..Default::default()
        };

        Self { state }
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.state.chat_response = response;
        self
    }

    pub fn with_error(mut self, status: u16, body: Value) -> Self {
        self.state.error = Some((status, body));
        self
    }

    pub fn with_stream_chunks(mut self, chunks: Vec<Value>) -> Self {
        let mut body = String::new();

        for chunk in chunks {
            body.push_str(&format!("data: {chunk}\n\n"));
        }

        body.push_str("data: [DONE]\n\n");
        self.state.stream_body = Some(body);
        self
    }

    pub fn with_models(mut self, ids: Vec<&str>) -> Self {
        let data: Vec<Value> = ids
            .into_iter()
            .map(|id| json!({"id": id, "object": "model", "created": 1715367049, "owned_by": "system"}))
            .collect();

        self.state.models_response = json!({"object": "list", "data": data});
        self
    }

    pub async fn spawn(self) -> anyhow::Result<SpawnedMock> {
        let state = Arc::new(self.state);

        let router = Router::new()
            .route("/chat/completions", post(openai_chat))
            .route("/models", get(openai_models))
            .with_state(Arc::clone(&state));

        spawn(router, state).await
    }
}

async fn openai_chat(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let credential = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);

    let streaming = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
    state.record(body, credential);

    if let Some(error) = state.error_response() {
        return error;
    }

    if streaming {
        return state.sse_response();
    }

    Json(state.chat_response.clone()).into_response()
}

async fn openai_models(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let credential = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);

    state.record(Value::Null, credential);

    if let Some(error) = state.error_response() {
        return error;
    }

    Json(state.models_response.clone()).into_response()
}

/// Builder for an Anthropic Messages API upstream.
pub struct AnthropicMock {
    state: MockState,
}

impl Default for AnthropicMock {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicMock {
    pub fn new() -> Self {
        let state = MockState {
            chat_response: json!({
                "id": "msg_mock",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "Hello from Claude"}],
                "model": "claude-3-5-sonnet-20241022",
                "stop_reason": "end_turn",
                "stop_sequence": null,
                "usage": {"input_tokens": 10, "output_tokens": 5}
            }),
            ..Default::default()
        };

        Self { state }
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.state.chat_response = response;
        self
    }

    pub fn with_error(mut self, status: u16, body: Value) -> Self {
        self.state.error = Some((status, body));
        self
    }

    /// Raw SSE body for streaming requests, `event:`/`data:` lines included.
    pub fn with_sse_body(mut self, body: impl Into<String>) -> Self {
        self.state.stream_body = Some(body.into());
        self
    }

    /// The standard happy-path event sequence: message_start, two text
    /// deltas ("Hel", "lo"), message_delta with end_turn, message_stop.
    pub fn with_standard_stream(self) -> Self {
        self.with_sse_body(concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_mock\",\"role\":\"assistant\"}}\n",
            "\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n",
            "\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n",
            "\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n",
            "\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n",
            "\n",
        ))
    }

    pub async fn spawn(self) -> anyhow::Result<SpawnedMock> {
        let state = Arc::new(self.state);

        let router = Router::new()
            .route("/v1/messages", post(anthropic_messages))
            .with_state(Arc::clone(&state));

        spawn(router, state).await
    }
}

async fn anthropic_messages(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let credential = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);

    let streaming = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
    state.record(body, credential);

    if let Some(error) = state.error_response() {
        return error;
    }

    if streaming {
        return state.sse_response();
    }

    Json(state.chat_response.clone()).into_response()
}

/// Builder for a Google Gemini generateContent upstream.
pub struct GoogleMock {
    state: MockState,
}

impl Default for GoogleMock {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleMock {
    pub fn new() -> Self {
        let state = MockState {
            chat_response: json!({
                "candidates": [{
                    "content": {"parts": [{"text": "Hello from Gemini"}], "role": "model"},
                    "finishReason": "STOP",
                    "index": 0
                }],
                "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 4, "totalTokenCount": 12}
            }),
            models_response: json!({
                "models": [
                    {
                        "name": "models/gemini-1.5-pro",
                        "supportedGenerationMethods": ["generateContent", "countTokens"]
                    },
                    {
                        "name": "models/text-embedding-004",
                        "supportedGenerationMethods": ["embedContent"]
                    }
                ]
            }),
            ..Default::default()
        };

        Self { state }
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.state.chat_response = response;
        self
    }

    pub fn with_error(mut self, status: u16, body: Value) -> Self {
        self.state.error = Some((status, body));
        self
    }

    /// Stream frames as generateContent JSON documents, one per SSE event.
    pub fn with_stream_frames(mut self, frames: Vec<Value>) -> Self {
        let mut body = String::new();

        for frame in frames {
            body.push_str(&format!("data: {frame}\n\n"));
        }

        self.state.stream_body = Some(body);
        self
    }

    pub async fn spawn(self) -> anyhow::Result<SpawnedMock> {
        let state = Arc::new(self.state);

        let router = Router::new()
            .route("/models/{action}", post(google_generate))
            .route("/models", get(google_models))
            .with_state(Arc::clone(&state));

        spawn(router, state).await
    }
}

async fn google_generate(
    State(state): State<Arc<MockState>>,
    Path(action): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    state.record(body, query.get("key").cloned());

    if let Some(error) = state.error_response() {
        return error;
    }

    if action.ends_with(":streamGenerateContent") {
        return state.sse_response();
    }

    Json(state.chat_response.clone()).into_response()
}

async fn google_models(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.record(Value::Null, query.get("key").cloned());

    if let Some(error) = state.error_response() {
        return error;
    }

    Json(state.models_response.clone()).into_response()
}
