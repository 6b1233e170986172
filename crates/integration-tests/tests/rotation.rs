//! Credential rotation observed end to end.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use indoc::formatdoc;
use integration_tests::{TestGateway, mocks};
use serde_json::json;

#[tokio::test]
async fn round_robin_distributes_keys_evenly_under_concurrency() {
    let upstream = mocks::OpenAiMock::new().spawn().await.unwrap();

    let gateway = Arc::new(
        TestGateway::spawn(&formatdoc! {r#"
            [server]
            client_api_keys = ["sk-test-client"]

            [llm.providers.p1]
            type = "openai"
            api_keys = ["sk-alpha-0001", "sk-bravo-0002", "sk-charlie-03"]
            base_url = "{url}"
        "#, url = upstream.base_url()})
        .await
        .unwrap(),
    );

    let requests = (0..30).map(|_| {
        let gateway = Arc::clone(&gateway);
        async move {
            let response = gateway
                .chat(json!({
                    "model": "gpt-4o",
                    "messages": [{"role": "user", "content": "ping"}]
                }))
                .await;

            assert_eq!(response.status(), 200);
        }
    });

    join_all(requests).await;

    let mut seen: HashMap<String, usize> = HashMap::new();
    for credential in upstream.credentials() {
        *seen.entry(credential).or_default() += 1;
    }

    assert_eq!(seen.len(), 3);
    assert_eq!(seen["Bearer sk-alpha-0001"], 10);
    assert_eq!(seen["Bearer sk-bravo-0002"], 10);
    assert_eq!(seen["Bearer sk-charlie-03"], 10);
}

#[tokio::test]
async fn stats_report_masked_usage_counters() {
    let upstream = mocks::OpenAiMock::new().spawn().await.unwrap();

    let gateway = TestGateway::spawn(&formatdoc! {r#"
        [server]
        client_api_keys = ["sk-test-client"]

        [llm.providers.p1]
        type = "openai"
        api_keys = ["sk-alpha-0001", "sk-bravo-0002"]
        rotation_strategy = "least_used"
        base_url = "{url}"
    "#, url = upstream.base_url()})
    .await
    .unwrap();

    for _ in 0..4 {
        let response = gateway
            .chat(json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "ping"}]
            }))
            .await;
        assert_eq!(response.status(), 200);
    }

    // Stats are operational and unauthenticated.
    let response = gateway.get_unauthenticated("/stats").await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let provider = &body["p1"];

    assert_eq!(provider["strategy"], "least_used");
    assert_eq!(provider["api_key_usage"]["sk-a****0001"], 2);
    assert_eq!(provider["api_key_usage"]["sk-b****0002"], 2);

    // Raw keys never appear in the stats payload.
    let rendered = body.to_string();
    assert!(!rendered.contains("sk-alpha-0001"));
    assert!(!rendered.contains("sk-bravo-0002"));
}
