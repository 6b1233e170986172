//! Configuration for the OpenRelay gateway.
//!
//! The configuration is a TOML document. String values support
//! `{{ env.NAME }}` interpolation, so credentials can stay out of the file.

mod llm;
mod loader;
mod server;

use std::path::Path;

use serde::Deserialize;

pub use llm::{
    AnthropicConfig, GoogleConfig, LlmConfig, LlmProviderConfig, OpenAiConfig, RotationStrategy,
};
pub use server::ServerConfig;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server settings and accepted client credentials.
    pub server: ServerConfig,

    /// Upstream LLM provider settings.
    pub llm: LlmConfig,
}

impl Config {
    /// Load and validate the configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        loader::load(path)
    }
}
