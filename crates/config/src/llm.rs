//! LLM provider configuration.

use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::Deserialize;

/// LLM gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Whether the LLM endpoints are enabled.
    pub enabled: bool,

    /// Fabricate an SSE response from a single upstream reply when a client
    /// requests streaming from a provider whose upstream cannot stream.
    ///
    /// When disabled, such requests are rejected with an invalid request
    /// error instead.
    pub synthetic_streaming: bool,

    /// Map of provider name to provider configuration.
    pub providers: BTreeMap<String, LlmProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            synthetic_streaming: true,
            providers: BTreeMap::new(),
        }
    }
}

impl LlmConfig {
    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }
}

/// Per-provider configuration, tagged by the upstream protocol dialect.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LlmProviderConfig {
    /// An OpenAI-shaped upstream.
    Openai(OpenAiConfig),
    /// An Anthropic Messages API upstream.
    Anthropic(AnthropicConfig),
    /// A Google Gemini generateContent upstream.
    Google(GoogleConfig),
}

impl LlmProviderConfig {
    /// The credential pool for this provider.
    pub fn api_keys(&self) -> &[SecretString] {
        match self {
            Self::Openai(config) => &config.api_keys,
            Self::Anthropic(config) => &config.api_keys,
            Self::Google(config) => &config.api_keys,
        }
    }

    /// The credential selection strategy for this provider.
    pub fn rotation_strategy(&self) -> RotationStrategy {
        match self {
            Self::Openai(config) => config.rotation_strategy,
            Self::Anthropic(config) => config.rotation_strategy,
            Self::Google(config) => config.rotation_strategy,
        }
    }
}

/// The policy used to pick one credential from the pool per upstream call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    /// Cycle through the keys in order.
    #[default]
    RoundRobin,
    /// Pick a key uniformly at random.
    Random,
    /// Pick the key with the lowest usage count.
    LeastUsed,
}

impl RotationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
            Self::LeastUsed => "least_used",
        }
    }
}

/// OpenAI-shaped provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// Credential pool for this provider (supports environment variable
    /// interpolation). At least one key is required.
    #[serde(default)]
    pub api_keys: Vec<SecretString>,
    /// Custom base URL (defaults to https://api.openai.com/v1).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Credential selection strategy.
    #[serde(default)]
    pub rotation_strategy: RotationStrategy,
    /// Whether the upstream supports SSE streaming.
    #[serde(default = "default_true")]
    pub streaming: bool,
}

/// Anthropic provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// Credential pool for this provider (supports environment variable
    /// interpolation). At least one key is required.
    #[serde(default)]
    pub api_keys: Vec<SecretString>,
    /// Custom base URL (defaults to https://api.anthropic.com).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Credential selection strategy.
    #[serde(default)]
    pub rotation_strategy: RotationStrategy,
    /// Whether the upstream supports SSE streaming.
    #[serde(default = "default_true")]
    pub streaming: bool,
}

/// Google Gemini provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoogleConfig {
    /// Credential pool for this provider (supports environment variable
    /// interpolation). At least one key is required.
    #[serde(default)]
    pub api_keys: Vec<SecretString>,
    /// Custom base URL (defaults to https://generativelanguage.googleapis.com/v1beta).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Credential selection strategy.
    #[serde(default)]
    pub rotation_strategy: RotationStrategy,
    /// Whether the upstream supports SSE streaming.
    #[serde(default = "default_true")]
    pub streaming: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use insta::assert_debug_snapshot;

    #[test]
    fn llm_config_defaults() {
        let config: LlmConfig = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        LlmConfig {
            enabled: true,
            synthetic_streaming: true,
            providers: {},
        }
        "#);
    }

    #[test]
    fn llm_config_with_openai() {
        let config = indoc! {r#"
            [providers.openai]
            type = "openai"
            api_keys = ["sk-first", "sk-second"]
        "#};

        let config: LlmConfig = toml::from_str(config).unwrap();

        assert_debug_snapshot!(&config, @r#"
        LlmConfig {
            enabled: true,
            synthetic_streaming: true,
            providers: {
                "openai": Openai(
                    OpenAiConfig {
                        api_keys: [
                            SecretBox<str>([REDACTED]),
                            SecretBox<str>([REDACTED]),
                        ],
                        base_url: None,
                        rotation_strategy: RoundRobin,
                        streaming: true,
                    },
                ),
            },
        }
        "#);
    }

    #[test]
    fn llm_config_with_anthropic_rotation() {
        let config = indoc! {r#"
            [providers.claude]
            type = "anthropic"
            api_keys = ["sk-ant-one"]
            rotation_strategy = "least_used"
        "#};

        let config: LlmConfig = toml::from_str(config).unwrap();

        assert_debug_snapshot!(&config, @r#"
        LlmConfig {
            enabled: true,
            synthetic_streaming: true,
            providers: {
                "claude": Anthropic(
                    AnthropicConfig {
                        api_keys: [
                            SecretBox<str>([REDACTED]),
                        ],
                        base_url: None,
                        rotation_strategy: LeastUsed,
                        streaming: true,
                    },
                ),
            },
        }
        "#);
    }

    #[test]
    fn llm_config_with_google_custom_url() {
        let config = indoc! {r#"
            synthetic_streaming = false

            [providers.gemini]
            type = "google"
            api_keys = ["AIza-key"]
            base_url = "http://localhost:9090/v1beta"
            streaming = false
        "#};

        let config: LlmConfig = toml::from_str(config).unwrap();

        assert_debug_snapshot!(&config, @r#"
        LlmConfig {
            enabled: true,
            synthetic_streaming: false,
            providers: {
                "gemini": Google(
                    GoogleConfig {
                        api_keys: [
                            SecretBox<str>([REDACTED]),
                        ],
                        base_url: Some(
                            "http://localhost:9090/v1beta",
                        ),
                        rotation_strategy: RoundRobin,
                        streaming: false,
                    },
                ),
            },
        }
        "#);
    }

    #[test]
    fn llm_config_invalid_provider_type() {
        let config = indoc! {r#"
            [providers.invalid]
            type = "unknown-provider"
            api_keys = ["key"]
        "#};

        let result: Result<LlmConfig, _> = toml::from_str(config);
        assert!(result.is_err());

        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("unknown variant"));
    }

    #[test]
    fn llm_config_invalid_rotation_strategy() {
        let config = indoc! {r#"
            [providers.openai]
            type = "openai"
            api_keys = ["key"]
            rotation_strategy = "fastest"
        "#};

        let result: Result<LlmConfig, _> = toml::from_str(config);
        assert!(result.is_err());
    }
}
