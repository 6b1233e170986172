use serde::Serialize;

use crate::{
    messages::{ChatCompletionRequest, ChatRole, ContentPart, MessageContent},
    provider::images,
};

/// Request body for the Anthropic Messages API.
#[derive(Debug, Serialize)]
pub(super) struct AnthropicRequest {
    pub model: String,

    /// Conversation messages with roles restricted to user and assistant.
    pub messages: Vec<AnthropicMessage>,

    /// System prompt, extracted from the canonical system messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Required by the upstream; defaulted when the client omits it.
    pub max_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    pub stream: bool,
}

const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
pub(super) struct AnthropicMessage {
    pub role: ChatRole,
    pub content: AnthropicContent,
}

/// Message content: a plain string, or content blocks for multi-modal input.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(super) enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
pub(super) struct ImageSource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media_type: &'static str,
    pub data: String,
}

impl From<ChatCompletionRequest> for AnthropicRequest {
    fn from(request: ChatCompletionRequest) -> Self {
        if request.tools.is_some() || request.tool_choice.is_some() {
            log::debug!("Dropping tool definitions: not translated for the Anthropic dialect");
        }

        let mut system_messages = Vec::new();
        let mut messages = Vec::new();

        for message in request.messages {
            match message.role {
                ChatRole::System => {
                    if let Some(MessageContent::Text(text)) = message.content {
                        system_messages.push(text);
                    }
                }
                ChatRole::Assistant | ChatRole::User => {
                    let Some(content) = message.content.and_then(convert_content) else {
                        continue;
                    };

                    messages.push(AnthropicMessage {
                        role: message.role,
                        content,
                    });
                }
                ChatRole::Tool => {
                    log::debug!("Dropping tool result message: not translated for the Anthropic dialect");
                }
                ChatRole::Other(role) => {
                    log::warn!("Unknown chat role from request: {role}, treating as user");

                    let Some(content) = message.content.and_then(convert_content) else {
                        continue;
                    };

                    messages.push(AnthropicMessage {
                        role: ChatRole::User,
                        content,
                    });
                }
            }
        }

        let system = if system_messages.is_empty() {
            None
        } else {
            Some(system_messages.join("\n\n"))
        };

        AnthropicRequest {
            model: request.model,
            messages,
            system,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            top_p: request.top_p,
            stop_sequences: request.stop,
            stream: false,
        }
    }
}

fn convert_content(content: MessageContent) -> Option<AnthropicContent> {
    match content {
        MessageContent::Text(text) => Some(AnthropicContent::Text(text)),
        MessageContent::Parts(parts) => {
            let mut blocks = Vec::with_capacity(parts.len());

            for part in parts {
                match part {
                    ContentPart::Text { text } => blocks.push(ContentBlock::Text { text }),
                    ContentPart::ImageUrl { image_url } => {
                        // The upstream only accepts inline base64; remote
                        // URLs cannot be forwarded.
                        match images::parse_data_url(&image_url.url) {
                            Some(image) => blocks.push(ContentBlock::Image {
                                source: ImageSource {
                                    kind: "base64",
                                    media_type: image.media_type,
                                    data: image.data,
                                },
                            }),
                            None => {
                                log::debug!("Dropping non-data image URL for Anthropic upstream");
                            }
                        }
                    }
                }
            }

            if blocks.is_empty() { None } else { Some(AnthropicContent::Blocks(blocks)) }
        }
    }
}
