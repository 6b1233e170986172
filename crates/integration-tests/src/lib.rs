//! Test harness for the gateway: spawns the real server over loopback HTTP
//! against in-process mock upstream providers.

pub mod mocks;

use std::net::SocketAddr;

use serde_json::Value;

/// A gateway instance bound to an ephemeral port.
pub struct TestGateway {
    pub address: SocketAddr,
    client: reqwest::Client,
}

/// The bearer token the test configurations accept.
pub const CLIENT_KEY: &str = "sk-test-client";

impl TestGateway {
    /// Spawn the gateway from a TOML configuration string.
    pub async fn spawn(config_toml: &str) -> anyhow::Result<Self> {
        let config: config::Config = toml::from_str(config_toml)?;
        let app = server::app(&config)?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("gateway server crashed");
        });

        Ok(Self {
            address,
            client: reqwest::Client::new(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.address)
    }

    /// POST a chat completion with the default client key.
    pub async fn chat(&self, body: Value) -> reqwest::Response {
        self.chat_with_bearer(Some(CLIENT_KEY), body).await
    }

    /// POST a chat completion with an explicit (or absent) bearer token.
    pub async fn chat_with_bearer(&self, bearer: Option<&str>, body: Value) -> reqwest::Response {
        let mut request = self.client.post(self.url("/v1/chat/completions")).json(&body);

        if let Some(bearer) = bearer {
            request = request.bearer_auth(bearer);
        }

        request.send().await.expect("chat request failed")
    }

    /// GET an authenticated path.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(CLIENT_KEY)
            .send()
            .await
            .expect("get request failed")
    }

    /// GET without credentials.
    pub async fn get_unauthenticated(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("get request failed")
    }
}

/// Split an SSE body into its `data:` payloads, excluding the terminator.
/// Returns the payloads and whether `[DONE]` was seen.
pub fn parse_sse_data(body: &str) -> (Vec<Value>, bool) {
    let mut frames = Vec::new();
    let mut done = false;

    for line in body.lines() {
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };

        if data.trim() == "[DONE]" {
            done = true;
            continue;
        }

        if data.trim().is_empty() {
            continue;
        }

        frames.push(serde_json::from_str(data).expect("SSE frame is not valid JSON"));
    }

    (frames, done)
}
