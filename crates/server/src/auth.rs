//! Client authentication middleware.
//!
//! Validates `Authorization: Bearer <token>` against the configured set of
//! gateway keys. The core behind this gate only ever observes requests
//! that passed it.

use std::{collections::HashSet, sync::Arc};

use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use llm::ErrorResponse;
use secrecy::{ExposeSecret, SecretString};

/// The accepted client tokens, indexed for constant-time lookup.
pub(crate) struct AuthState {
    keys: HashSet<String>,
}

impl AuthState {
    pub fn new(client_api_keys: &[SecretString]) -> Arc<Self> {
        let keys = client_api_keys
            .iter()
            .map(|key| key.expose_secret().to_string())
            .collect();

        Arc::new(Self { keys })
    }
}

/// Reject requests that do not carry a known bearer token.
pub(crate) async fn authenticate(
    State(state): State<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(header) = request.headers().get(AUTHORIZATION) else {
        return unauthorized("Missing Authorization header", "missing_api_key");
    };

    let Ok(header) = header.to_str() else {
        return unauthorized(
            "Invalid Authorization header format. Expected: Bearer <token>",
            "invalid_api_key_format",
        );
    };

    let Some(token) = header.strip_prefix("Bearer ") else {
        return unauthorized(
            "Invalid Authorization header format. Expected: Bearer <token>",
            "invalid_api_key_format",
        );
    };

    if !state.keys.contains(token) {
        return unauthorized("Invalid API key", "invalid_api_key");
    }

    next.run(request).await
}

fn unauthorized(message: &str, code: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new(message, "invalid_request_error", code)),
    )
        .into_response()
}
