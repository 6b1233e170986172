//! Client authentication middleware contract.

use indoc::formatdoc;
use integration_tests::{TestGateway, mocks};
use serde_json::json;

async fn gateway_with_upstream() -> (TestGateway, mocks::SpawnedMock) {
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

    (gateway, upstream)
}

fn chat_body() -> serde_json::Value {
    json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "ping"}]})
}

#[tokio::test]
async fn missing_authorization_header() {
    let (gateway, upstream) = gateway_with_upstream().await;

    let response = gateway.chat_with_bearer(None, chat_body()).await;

    assert_eq!(response.status(), 401);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["code"], "missing_api_key");
    assert!(upstream.requests().is_empty());
}

#[tokio::test]
async fn non_bearer_authorization_header() {
    let (gateway, _upstream) = gateway_with_upstream().await;

    let response = reqwest::Client::new()
        .post(gateway.url("/v1/chat/completions"))
        .header("authorization", "Basic dXNlcjpwYXNz")
        .json(&chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invalid_api_key_format");
}

#[tokio::test]
async fn unknown_token_is_rejected() {
    let (gateway, upstream) = gateway_with_upstream().await;

    let response = gateway.chat_with_bearer(Some("sk-wrong"), chat_body()).await;

    assert_eq!(response.status(), 401);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invalid_api_key");
    assert!(upstream.requests().is_empty());
}

#[tokio::test]
async fn valid_token_passes_the_gate() {
    let (gateway, _upstream) = gateway_with_upstream().await;

    let response = gateway.chat(chat_body()).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn models_endpoints_require_authentication() {
    let (gateway, _upstream) = gateway_with_upstream().await;

    let response = gateway.get_unauthenticated("/v1/models").await;
    assert_eq!(response.status(), 401);

    let response = gateway.get_unauthenticated("/v1/models/p1/gpt-4o").await;
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn health_is_open() {
    let (gateway, _upstream) = gateway_with_upstream().await;

    let response = gateway.get_unauthenticated("/health").await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "openrelay");
}
