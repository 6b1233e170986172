//! Non-streaming chat completion behavior.

use indoc::formatdoc;
use integration_tests::{TestGateway, mocks};
use serde_json::json;

#[tokio::test]
async fn single_provider_passthrough_non_streaming() {
    let upstream = mocks::OpenAiMock::new()
        .with_response(json!({
            "id": "X",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "pong"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        }))
        .spawn()
        .await
        .unwrap();

    let gateway = TestGateway::spawn(&formatdoc! {r#"
        [server]
        client_api_keys = ["sk-test-client"]

        [llm.providers.p1]
        type = "openai"
        api_keys = ["sk-upstream"]
        base_url = "{url}"
    "#, url = upstream.base_url()})
    .await
    .unwrap();

    let response = gateway
        .chat(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "ping"}],
            "stream": false
        }))
        .await;

    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(
        body,
        json!({
            "id": "X",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "pong"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })
    );

    // The upstream saw a bearer credential from the provider pool.
    assert_eq!(upstream.credentials(), vec!["Bearer sk-upstream".to_string()]);
}

#[tokio::test]
async fn prefixed_routing_across_two_providers() {
    let openai = mocks::OpenAiMock::new()
        .with_models(vec!["gpt-4o"])
        .spawn()
        .await
        .unwrap();

    let anthropic = mocks::AnthropicMock::new().spawn().await.unwrap();

    let gateway = TestGateway::spawn(&formatdoc! {r#"
        [server]
        client_api_keys = ["sk-test-client"]

        [llm.providers.oa]
        type = "openai"
        api_keys = ["sk-oa"]
        base_url = "{oa}"

        [llm.providers.cl]
        type = "anthropic"
        api_keys = ["sk-cl"]
        base_url = "{cl}"
    "#, oa = openai.base_url(), cl = anthropic.base_url()})
    .await
    .unwrap();

    // Populate the routing table.
    let models: serde_json::Value = gateway.get("/v1/models").await.json().await.unwrap();
    let ids: Vec<&str> = models["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();

    assert!(ids.contains(&"oa/gpt-4o"));
    assert!(ids.contains(&"cl/claude-3-5-sonnet-20241022"));

    let response = gateway
        .chat(json!({
            "model": "cl/claude-3-5-sonnet-20241022",
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "system", "content": "Answer in French."},
                {"role": "user", "content": "hello"}
            ]
        }))
        .await;

    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();

    // The response echoes the prefixed id the client asked for.
    assert_eq!(body["model"], "cl/claude-3-5-sonnet-20241022");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello from Claude");
    assert_eq!(body["usage"]["total_tokens"], 15);

    // The upstream saw the unprefixed model id and the joined system prompt.
    let sent = anthropic.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["model"], "claude-3-5-sonnet-20241022");
    assert_eq!(sent[0]["system"], "Be brief.\n\nAnswer in French.");
    assert_eq!(sent[0]["max_tokens"], 4096);
    assert_eq!(sent[0]["messages"].as_array().unwrap().len(), 1);

    assert_eq!(anthropic.credentials(), vec!["sk-cl".to_string()]);
}

#[tokio::test]
async fn unknown_model_with_two_providers_is_bad_request() {
    let openai = mocks::OpenAiMock::new().spawn().await.unwrap();
    let anthropic = mocks::AnthropicMock::new().spawn().await.unwrap();

    let gateway = TestGateway::spawn(&formatdoc! {r#"
        [server]
        client_api_keys = ["sk-test-client"]

        [llm.providers.oa]
        type = "openai"
        api_keys = ["sk-oa"]
        base_url = "{oa}"

        [llm.providers.cl]
        type = "anthropic"
        api_keys = ["sk-cl"]
        base_url = "{cl}"
    "#, oa = openai.base_url(), cl = anthropic.base_url()})
    .await
    .unwrap();

    let response = gateway
        .chat(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "ping"}]
        }))
        .await;

    assert_eq!(response.status(), 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["code"], "model_not_found");
}

#[tokio::test]
async fn upstream_quota_error_maps_to_canonical_envelope() {
    let upstream = mocks::OpenAiMock::new()
        .with_error(429, json!({"error": {"message": "you have exceeded your quota"}}))
        .spawn()
        .await
        .unwrap();

    let gateway = TestGateway::spawn(&formatdoc! {r#"
        [server]
        client_api_keys = ["sk-test-client"]

        [llm.providers.p1]
        type = "openai"
        api_keys = ["sk-upstream"]
        base_url = "{url}"
    "#, url = upstream.base_url()})
    .await
    .unwrap();

    let response = gateway
        .chat(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "ping"}]
        }))
        .await;

    assert_eq!(response.status(), 429);

    let body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(
        body,
        json!({
            "error": {
                "message": "you have exceeded your quota",
                "type": "rate_limit_error",
                "code": "quota_exceeded"
            }
        })
    );
}

#[tokio::test]
async fn google_translation_and_safety_finish_reason() {
    let upstream = mocks::GoogleMock::new()
        .with_response(json!({
            "candidates": [{
                "content": {"parts": [{"text": "I cannot help with that."}], "role": "model"},
                "finishReason": "SAFETY",
                "index": 0
            }],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 6, "totalTokenCount": 11}
        }))
        .spawn()
        .await
        .unwrap();

    let gateway = TestGateway::spawn(&formatdoc! {r#"
        [server]
        client_api_keys = ["sk-test-client"]

        [llm.providers.gg]
        type = "google"
        api_keys = ["AIza-mock"]
        base_url = "{url}"
    "#, url = upstream.base_url()})
    .await
    .unwrap();

    let response = gateway
        .chat(json!({
            "model": "gemini-1.5-pro",
            "messages": [
                {"role": "system", "content": "Be safe."},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "continue"}
            ],
            "max_tokens": 64,
            "temperature": 0.2
        }))
        .await;

    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["model"], "gemini-1.5-pro");
    assert_eq!(body["choices"][0]["finish_reason"], "content_filter");
    assert_eq!(body["usage"]["total_tokens"], 11);

    // The credential traveled as a query parameter, not a header.
    assert_eq!(upstream.credentials(), vec!["AIza-mock".to_string()]);

    let sent = upstream.requests();
    assert_eq!(sent.len(), 1);

    // System messages became the system instruction; assistant became model.
    assert_eq!(sent[0]["systemInstruction"]["parts"][0]["text"], "Be safe.");
    let contents = sent[0]["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["role"], "user");
    assert_eq!(contents[1]["role"], "model");

    // Sampling parameters and permissive safety settings are always sent.
    assert_eq!(sent[0]["generationConfig"]["maxOutputTokens"], 64);
    let safety = sent[0]["safetySettings"].as_array().unwrap();
    assert_eq!(safety.len(), 4);
    assert!(safety.iter().all(|s| s["threshold"] == "BLOCK_NONE"));
}

#[tokio::test]
async fn empty_messages_are_rejected() {
    let upstream = mocks::OpenAiMock::new().spawn().await.unwrap();

    let gateway = TestGateway::spawn(&formatdoc! {r#"
        [server]
        client_api_keys = ["sk-test-client"]

        [llm.providers.p1]
        type = "openai"
        api_keys = ["sk-upstream"]
        base_url = "{url}"
    "#, url = upstream.base_url()})
    .await
    .unwrap();

    let response = gateway.chat(json!({"model": "gpt-4o", "messages": []})).await;

    assert_eq!(response.status(), 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(upstream.requests().is_empty());
}

#[tokio::test]
async fn malformed_body_is_bad_request_with_envelope() {
    let upstream = mocks::OpenAiMock::new().spawn().await.unwrap();

    let gateway = TestGateway::spawn(&formatdoc! {r#"
        [server]
        client_api_keys = ["sk-test-client"]

        [llm.providers.p1]
        type = "openai"
        api_keys = ["sk-upstream"]
        base_url = "{url}"
    "#, url = upstream.base_url()})
    .await
    .unwrap();

    let response = reqwest::Client::new()
        .post(gateway.url("/v1/chat/completions"))
        .bearer_auth(integration_tests::CLIENT_KEY)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn streaming_disabled_policy_rejects_stream_requests() {
    let upstream = mocks::OpenAiMock::new().spawn().await.unwrap();

    let gateway = TestGateway::spawn(&formatdoc! {r#"
        [server]
        client_api_keys = ["sk-test-client"]

        [llm]
        synthetic_streaming = false

        [llm.providers.p1]
        type = "openai"
        api_keys = ["sk-upstream"]
        base_url = "{url}"
        streaming = false
    "#, url = upstream.base_url()})
    .await
    .unwrap();

    let response = gateway
        .chat(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "ping"}],
            "stream": true
        }))
        .await;

    assert_eq!(response.status(), 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(upstream.requests().is_empty());
}
