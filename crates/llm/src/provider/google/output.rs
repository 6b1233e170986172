use serde::Deserialize;

use crate::messages::{
    ChatChoice, ChatCompletionResponse, ChatRole, FinishReason, ObjectType, ResponseMessage, Usage,
    unix_timestamp,
};

/// Response from the Gemini generateContent API, also used frame by frame
/// in streaming mode.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GoogleGenerateResponse {
    #[serde(default)]
    pub candidates: Vec<GoogleCandidate>,

    #[serde(default)]
    pub usage_metadata: Option<GoogleUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GoogleCandidate {
    #[serde(default)]
    pub content: Option<GoogleCandidateContent>,

    #[serde(default)]
    pub index: u32,

    #[serde(default)]
    pub finish_reason: Option<GoogleFinishReason>,
}

impl GoogleCandidate {
    /// Concatenated text of all candidate parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .flat_map(|content| &content.parts)
            .filter_map(|part| part.text.as_deref())
            .collect()
    }

    /// Whether this candidate terminates the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self.finish_reason,
            None | Some(GoogleFinishReason::FinishReasonUnspecified)
        )
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct GoogleCandidateContent {
    #[serde(default)]
    pub parts: Vec<GoogleResponsePart>,
}

#[derive(Debug, Deserialize)]
pub(super) struct GoogleResponsePart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(super) enum GoogleFinishReason {
    FinishReasonUnspecified,
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Other,
    /// Any other finish reason not yet known. Captures the actual string
    /// value for forward compatibility.
    #[serde(untagged)]
    Unknown(String),
}

impl From<GoogleFinishReason> for FinishReason {
    fn from(reason: GoogleFinishReason) -> Self {
        match reason {
            GoogleFinishReason::MaxTokens => FinishReason::Length,
            GoogleFinishReason::Safety | GoogleFinishReason::Recitation => FinishReason::ContentFilter,
            GoogleFinishReason::Stop
            | GoogleFinishReason::Other
            | GoogleFinishReason::FinishReasonUnspecified => FinishReason::Stop,
            GoogleFinishReason::Unknown(reason) => {
                log::warn!("Unknown finish reason from Google: {reason}");
                FinishReason::Stop
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GoogleUsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

impl From<GoogleUsageMetadata> for Usage {
    fn from(metadata: GoogleUsageMetadata) -> Self {
        let mut usage = Usage::new(metadata.prompt_token_count, metadata.candidates_token_count);

        if metadata.total_token_count > 0 {
            usage.total_tokens = metadata.total_token_count;
        }

        usage
    }
}

impl GoogleGenerateResponse {
    /// Convert into a canonical response with the given id. The model field
    /// is stamped by the pipeline.
    pub fn into_response(self, id: String) -> ChatCompletionResponse {
        let choices = self
            .candidates
            .into_iter()
            .map(|candidate| {
                let content = candidate.text();

                ChatChoice {
                    index: candidate.index,
                    finish_reason: candidate
                        .finish_reason
                        .map(Into::into)
                        .unwrap_or(FinishReason::Stop),
                    message: ResponseMessage {
                        role: ChatRole::Assistant,
                        content,
                        tool_calls: None,
                    },
                }
            })
            .collect();

        ChatCompletionResponse {
            id,
            object: ObjectType::ChatCompletion,
            created: unix_timestamp(),
            model: String::new(),
            choices,
            usage: self.usage_metadata.map(Into::into).unwrap_or_default(),
        }
    }
}

/// Response from the Google models list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GoogleModelsResponse {
    #[serde(default)]
    pub models: Vec<GoogleModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GoogleModel {
    /// Upstream name, in the form `models/gemini-1.5-pro`.
    pub name: String,

    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}
