//! Downstream Server-Sent Events assembly.
//!
//! Every event is a `data: <json>` frame; the stream terminates with the
//! literal `data: [DONE]`. A mid-stream failure emits one canonical error
//! frame and closes without the terminator.

use std::{convert::Infallible, time::Duration};

use async_stream::stream;
use axum::{
    http::{HeaderValue, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::StreamExt;

use crate::{
    error::LlmError,
    messages::{
        ChatCompletionChunk, ChatCompletionResponse, ChunkChoice, ChunkDelta, ObjectType,
    },
    provider::ChatCompletionStream,
};

/// Build the SSE response for a stream of canonical chunks.
///
/// The client disconnecting drops this stream, which in turn drops the
/// adapter's upstream stream and releases the upstream connection.
pub(crate) fn sse_response(chunks: ChatCompletionStream) -> Response {
    let events = stream! {
        let mut chunks = chunks;
        let mut failed = false;

        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => match sonic_rs::to_string(&chunk) {
                    Ok(data) => yield Ok::<_, Infallible>(Event::default().data(data)),
                    Err(e) => {
                        log::error!("Failed to serialize streaming chunk: {e}");
                    }
                },
                Err(e) => {
                    log::error!("Stream error: {e}");
                    yield Ok(error_event(&e));
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            yield Ok(Event::default().data("[DONE]"));
        }
    };

    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(30)))
        .into_response();

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));

    response
}

/// One canonical error envelope as a data frame.
fn error_event(error: &LlmError) -> Event {
    let data = sonic_rs::to_string(&error.to_envelope())
        .unwrap_or_else(|_| r#"{"error":{"message":"Internal server error","type":"server_error","code":"server_error"}}"#.to_string());

    Event::default().data(data)
}

/// Fabricate the chunk sequence of an SSE response from a single
/// non-streaming upstream reply.
///
/// Per choice, in index order: one role and content chunk, then one
/// finish-reason chunk. A usage-only chunk follows, before the terminator.
/// Every chunk shares the response id, created stamp and model.
pub(crate) fn synthetic_stream(response: ChatCompletionResponse) -> ChatCompletionStream {
    Box::pin(futures::stream::iter(synthetic_chunks(response).into_iter().map(Ok)))
}

fn synthetic_chunks(response: ChatCompletionResponse) -> Vec<ChatCompletionChunk> {
    let ChatCompletionResponse {
        id,
        created,
        model,
        mut choices,
        usage,
        ..
    } = response;

    choices.sort_by_key(|choice| choice.index);

    let mut chunks = Vec::with_capacity(choices.len() * 2 + 1);

    let chunk = |choices: Vec<ChunkChoice>, usage| ChatCompletionChunk {
        id: id.clone(),
        object: ObjectType::ChatCompletionChunk,
        created,
        model: model.clone(),
        choices,
        usage,
    };

    for choice in choices {
        chunks.push(chunk(
            vec![ChunkChoice {
                index: choice.index,
                delta: ChunkDelta {
                    role: Some(choice.message.role),
                    content: Some(choice.message.content),
                    tool_calls: choice.message.tool_calls,
                },
                finish_reason: None,
            }],
            None,
        ));

        chunks.push(chunk(
            vec![ChunkChoice {
                index: choice.index,
                delta: ChunkDelta::default(),
                finish_reason: Some(choice.finish_reason),
            }],
            None,
        ));
    }

    chunks.push(chunk(Vec::new(), Some(usage)));

    chunks
}
