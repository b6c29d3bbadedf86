//! Connection settings for an OpenAI-compatible endpoint.

use std::time::Duration;

use pipeline::ModelName;

/// Gemini's OpenAI-compatible API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Settings for [`crate::OpenAiCompatibleProvider`].
#[derive(Clone)]
pub struct ProviderConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Base URL; `/chat/completions` is appended.
    pub base_url: String,
    pub model: ModelName,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Send `response_format: json_schema` on structured calls. Turn off for
    /// servers that reject it; the prompt still carries the schema.
    pub structured_output: bool,
}

impl ProviderConfig {
    /// Configuration for `model` on the default endpoint.
    pub fn new(api_key: impl Into<String>, model: ModelName) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            temperature: 0.0,
            max_output_tokens: None,
            timeout: Duration::from_secs(120),
            structured_output: true,
        }
    }

    /// Set a custom base URL (other providers, local servers, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_max_output_tokens(mut self, max_output_tokens: Option<u32>) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_structured_output(mut self, enabled: bool) -> Self {
        self.structured_output = enabled;
        self
    }

    pub(crate) fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

// The key never reaches logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("timeout", &self.timeout)
            .field("structured_output", &self.structured_output)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_the_key() {
        let config = ProviderConfig::new("sk-secret", ModelName::new("m").unwrap());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn trailing_slash_is_ignored() {
        let config = ProviderConfig::new("k", ModelName::new("m").unwrap())
            .with_base_url("http://localhost:11434/v1/");
        assert_eq!(config.completions_url(), "http://localhost:11434/v1/chat/completions");
    }
}
