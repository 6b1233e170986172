use serde::Deserialize;

use crate::messages::{
    ChatChoice, ChatCompletionResponse, ChatRole, FinishReason, ObjectType, ResponseMessage, Usage,
    unix_timestamp,
};

/// Response from the Anthropic Messages API.
#[derive(Debug, Deserialize)]
pub(super) struct AnthropicResponse {
    pub id: String,

    /// Conversational role of the generated message; always "assistant".
    pub role: ChatRole,

    /// Content blocks in the response.
    pub content: Vec<AnthropicContentBlock>,

    pub stop_reason: Option<StopReason>,

    pub usage: AnthropicUsage,
}

/// A content block in a message response. Only text blocks carry output
/// visible to the canonical format.
#[derive(Debug, Deserialize)]
pub(super) struct AnthropicContentBlock {
    pub r#type: String,

    #[serde(default)]
    pub text: Option<String>,
}

/// The reason the model stopped generating.
#[derive(Debug, Deserialize, PartialEq)]
pub(super) enum StopReason {
    #[serde(rename = "end_turn")]
    EndTurn,
    #[serde(rename = "max_tokens")]
    MaxTokens,
    #[serde(rename = "stop_sequence")]
    StopSequence,
    /// Any other stop reason not yet known. Captures the actual string
    /// value for forward compatibility.
    #[serde(untagged)]
    Other(String),
}

impl From<StopReason> for FinishReason {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::EndTurn | StopReason::StopSequence => FinishReason::Stop,
            StopReason::MaxTokens => FinishReason::Length,
            StopReason::Other(reason) => {
                log::warn!("Unknown stop reason from Anthropic: {reason}");
                FinishReason::Stop
            }
        }
    }
}

/// Token usage counters. Streaming deltas may carry only one side.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(super) struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

impl From<AnthropicUsage> for Usage {
    fn from(usage: AnthropicUsage) -> Self {
        Usage::new(usage.input_tokens, usage.output_tokens)
    }
}

impl From<AnthropicResponse> for ChatCompletionResponse {
    fn from(response: AnthropicResponse) -> Self {
        let content = response
            .content
            .iter()
            .filter_map(|block| match block.r#type.as_str() {
                "text" => block.text.as_deref(),
                _ => None,
            })
            .collect::<String>();

        Self {
            id: response.id,
            object: ObjectType::ChatCompletion,
            created: unix_timestamp(),
            model: String::new(), // Stamped by the pipeline.
            choices: vec![ChatChoice {
                index: 0,
                message: ResponseMessage {
                    role: response.role,
                    content,
                    tool_calls: None,
                },
                finish_reason: response
                    .stop_reason
                    .map(Into::into)
                    .unwrap_or(FinishReason::Stop),
            }],
            usage: response.usage.into(),
        }
    }
}

/// Server-sent events of a streaming Messages API response.
///
/// Unknown event types (ping, content_block_start, ...) collapse into
/// `Other` and are ignored by the parser.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum AnthropicStreamEvent {
    MessageStart,
    ContentBlockDelta {
        delta: ContentDelta,
    },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop {
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(super) struct ContentDelta {
    pub r#type: String,

    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct MessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
}
