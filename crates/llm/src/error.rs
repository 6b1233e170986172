use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Gateway errors, mapped onto the canonical OpenAI error envelope.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The request body failed validation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No provider serves the requested model identifier.
    #[error("No provider found for model: {0}")]
    ModelNotRouted(String),

    /// The model identifier is unknown to the routing table.
    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    /// The client requested streaming from an upstream that cannot stream.
    #[error("Streaming is not supported by the upstream provider. Set stream=false or omit the parameter.")]
    StreamingNotSupported,

    /// The provider's credential pool is empty.
    #[error("No API keys configured for provider '{0}'")]
    NoCredentials(String),

    /// The upstream connection failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The upstream call exceeded its timeout.
    #[error("Upstream request timed out: {0}")]
    Timeout(String),

    /// The upstream returned a non-success status. The message is the
    /// extracted upstream error text; categorization is status-driven.
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// Internal gateway error. `Some` carries an upstream-originated message
    /// safe to show; `None` hides gateway internals.
    #[error("Internal server error")]
    Internal(Option<String>),
}

impl LlmError {
    /// Build an upstream error from a response status and raw body,
    /// extracting the human-readable message from common error layouts.
    pub(crate) fn upstream(status: u16, body: String) -> Self {
        Self::Upstream {
            status,
            message: extract_message(&body),
        }
    }

    /// The HTTP status the gateway responds with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::ModelNotRouted(_) | Self::StreamingNotSupported => {
                StatusCode::BAD_REQUEST
            }
            Self::ModelNotFound(_) => StatusCode::NOT_FOUND,
            Self::NoCredentials(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Connection(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            // Upstream statuses pass through unchanged.
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }

    /// The `type` field of the canonical error envelope.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::ModelNotRouted(_) | Self::StreamingNotSupported => {
                "invalid_request_error"
            }
            Self::ModelNotFound(_) => "not_found_error",
            Self::NoCredentials(_) | Self::Internal(_) => "server_error",
            Self::Connection(_) => "api_error",
            Self::Timeout(_) => "timeout_error",
            Self::Upstream { status, message } => categorize(*status, message).0,
        }
    }

    /// The `code` field of the canonical error envelope.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::StreamingNotSupported => "invalid_request",
            Self::ModelNotRouted(_) | Self::ModelNotFound(_) => "model_not_found",
            Self::NoCredentials(_) | Self::Internal(_) | Self::Connection(_) => "server_error",
            Self::Timeout(_) => "timeout",
            Self::Upstream { status, message } => categorize(*status, message).1,
        }
    }

    /// Whether a retry against another key could plausibly succeed.
    /// Advisory only; the gateway never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Upstream {
                status: 429 | 500 | 502 | 503 | 504,
                ..
            }
        )
    }

    /// The canonical `{error: {...}}` envelope for this error.
    pub fn to_envelope(&self) -> ErrorResponse {
        let message = match self {
            Self::Upstream { message, .. } => message.clone(),
            Self::Internal(Some(upstream_msg)) => upstream_msg.clone(),
            Self::Internal(None) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        ErrorResponse::new(message, self.error_type(), self.error_code())
    }
}

/// Status-driven categorization into (type, code), with message sniffing
/// for the ambiguous 400 and 429 cases.
fn categorize(status: u16, message: &str) -> (&'static str, &'static str) {
    let message = message.to_lowercase();

    match status {
        400 => {
            if message.contains("context") || message.contains("token") {
                ("invalid_request_error", "context_length_exceeded")
            } else if message.contains("model") {
                ("invalid_request_error", "model_not_found")
            } else {
                ("invalid_request_error", "invalid_request")
            }
        }
        401 => ("authentication_error", "invalid_api_key"),
        403 => ("permission_error", "permission_denied"),
        404 => ("not_found_error", "model_not_found"),
        429 => {
            if message.contains("quota") {
                ("rate_limit_error", "quota_exceeded")
            } else {
                ("rate_limit_error", "rate_limit_exceeded")
            }
        }
        500 | 502 => ("server_error", "server_error"),
        503 => ("service_unavailable_error", "service_unavailable"),
        504 => ("timeout_error", "timeout"),
        _ => ("api_error", "server_error"),
    }
}

/// Find the error message in the formats upstreams actually produce.
fn extract_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };

    if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
        return message.to_string();
    }

    if let Some(error) = value.get("error") {
        if let Some(message) = error.as_str() {
            return message.to_string();
        }
        if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }

    if let Some(message) = value.get("detail").and_then(|m| m.as_str()) {
        return message.to_string();
    }

    body.to_string()
}

/// Error response format compatible with the OpenAI API.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, r#type: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                r#type: r#type.into(),
                code: code.into(),
                param: None,
            },
        }
    }
}

impl From<JsonRejection> for LlmError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for LlmError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            log::error!("Server error ({}): {self}", status.as_u16());
        }

        if self.is_retryable() {
            log::debug!("Upstream error is retryable; surfacing to the client without retry");
        }

        (status, Json(self.to_envelope())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_message_maps_to_quota_exceeded() {
        let error = LlmError::upstream(
            429,
            r#"{"error":{"message":"you have exceeded your quota"}}"#.to_string(),
        );

        assert_eq!(error.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error.error_type(), "rate_limit_error");
        assert_eq!(error.error_code(), "quota_exceeded");

        let envelope = error.to_envelope();
        assert_eq!(envelope.error.message, "you have exceeded your quota");
    }

    #[test]
    fn plain_rate_limit_maps_to_rate_limit_exceeded() {
        let error = LlmError::upstream(429, "slow down".to_string());

        assert_eq!(error.error_type(), "rate_limit_error");
        assert_eq!(error.error_code(), "rate_limit_exceeded");
    }

    #[test]
    fn context_length_sniffing_on_bad_request() {
        let error = LlmError::upstream(
            400,
            r#"{"error":{"message":"maximum context length is 8192 tokens"}}"#.to_string(),
        );

        assert_eq!(error.error_type(), "invalid_request_error");
        assert_eq!(error.error_code(), "context_length_exceeded");
    }

    #[test]
    fn model_sniffing_on_bad_request() {
        let error = LlmError::upstream(400, "the model `gpt-9` does not exist".to_string());

        assert_eq!(error.error_code(), "model_not_found");
    }

    #[test]
    fn upstream_status_passes_through() {
        let error = LlmError::upstream(503, "overloaded".to_string());

        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.error_type(), "service_unavailable_error");
        assert_eq!(error.error_code(), "service_unavailable");
        assert!(error.is_retryable());
    }

    #[test]
    fn unusual_status_is_api_error() {
        let error = LlmError::upstream(418, "teapot".to_string());

        assert_eq!(error.error_type(), "api_error");
        assert_eq!(error.error_code(), "server_error");
        assert!(!error.is_retryable());
    }

    #[test]
    fn message_extraction_handles_common_shapes() {
        assert_eq!(extract_message(r#"{"message":"direct"}"#), "direct");
        assert_eq!(extract_message(r#"{"error":"flat"}"#), "flat");
        assert_eq!(extract_message(r#"{"error":{"message":"nested"}}"#), "nested");
        assert_eq!(extract_message(r#"{"detail":"detailed"}"#), "detailed");
        assert_eq!(extract_message("not json at all"), "not json at all");
    }

    #[test]
    fn route_miss_is_a_client_error() {
        let error = LlmError::ModelNotRouted("mystery-model".to_string());

        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.error_type(), "invalid_request_error");
        assert_eq!(error.error_code(), "model_not_found");
    }

    #[test]
    fn unknown_model_lookup_is_not_found() {
        let error = LlmError::ModelNotFound("oa/gone".to_string());

        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(error.error_type(), "not_found_error");
        assert_eq!(error.error_code(), "model_not_found");
    }
}
