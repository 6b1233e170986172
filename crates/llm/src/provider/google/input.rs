use serde::Serialize;

use crate::{
    messages::{ChatCompletionRequest, ChatRole, ContentPart, MessageContent},
    provider::images,
};

/// Request body for the Gemini generateContent API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GoogleGenerateRequest {
    /// The conversation, in upstream roles (user / model).
    pub contents: Vec<GoogleContent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GoogleGenerationConfig>,

    /// Always set: the gateway reports upstream safety decisions to the
    /// client instead of pre-filtering.
    pub safety_settings: Vec<GoogleSafetySetting>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GoogleContent>,
}

#[derive(Debug, Serialize)]
pub(super) struct GoogleContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<GoogleRole>,
    pub parts: Vec<GooglePart>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(super) enum GoogleRole {
    User,
    Model,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GooglePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<GoogleInlineData>,
}

impl GooglePart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            inline_data: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GoogleInlineData {
    pub mime_type: &'static str,
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GoogleGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(super) struct GoogleSafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

/// The four categories the upstream filters on, all opened up so safety
/// verdicts surface as finish reasons instead of silent blocking.
fn permissive_safety_settings() -> Vec<GoogleSafetySetting> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .into_iter()
    .map(|category| GoogleSafetySetting {
        category,
        threshold: "BLOCK_NONE",
    })
    .collect()
}

impl From<ChatCompletionRequest> for GoogleGenerateRequest {
    fn from(request: ChatCompletionRequest) -> Self {
        if request.tools.is_some() || request.tool_choice.is_some() {
            log::debug!("Dropping tool definitions: not translated for the Google dialect");
        }

        let mut contents = Vec::new();
        let mut system_parts = Vec::new();

        for message in request.messages {
            match message.role {
                ChatRole::System => {
                    if let Some(MessageContent::Text(text)) = message.content {
                        system_parts.push(GooglePart::text(text));
                    }
                }
                ChatRole::Assistant => {
                    push_content(&mut contents, GoogleRole::Model, message.content);
                }
                ChatRole::User => {
                    push_content(&mut contents, GoogleRole::User, message.content);
                }
                ChatRole::Tool => {
                    log::debug!("Dropping tool result message: not translated for the Google dialect");
                }
                ChatRole::Other(role) => {
                    log::warn!("Unknown chat role from request: {role}, treating as user");
                    push_content(&mut contents, GoogleRole::User, message.content);
                }
            }
        }

        let system_instruction = if system_parts.is_empty() {
            None
        } else {
            Some(GoogleContent {
                role: None,
                parts: system_parts,
            })
        };

        let generation_config = GoogleGenerationConfig {
            temperature: request.temperature,
            top_p: request.top_p,
            max_output_tokens: request.max_tokens,
        };

        Self {
            contents,
            generation_config: Some(generation_config),
            safety_settings: permissive_safety_settings(),
            system_instruction,
        }
    }
}

fn push_content(contents: &mut Vec<GoogleContent>, role: GoogleRole, content: Option<MessageContent>) {
    let parts = match content {
        Some(MessageContent::Text(text)) => vec![GooglePart::text(text)],
        Some(MessageContent::Parts(parts)) => parts
            .into_iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(GooglePart::text(text)),
                ContentPart::ImageUrl { image_url } => match images::parse_data_url(&image_url.url) {
                    Some(image) => Some(GooglePart {
                        text: None,
                        inline_data: Some(GoogleInlineData {
                            mime_type: image.media_type,
                            data: image.data,
                        }),
                    }),
                    None => {
                        log::debug!("Dropping non-data image URL for Google upstream");
                        None
                    }
                },
            })
            .collect(),
        None => Vec::new(),
    };

    if !parts.is_empty() {
        contents.push(GoogleContent {
            role: Some(role),
            parts,
        });
    }
}
