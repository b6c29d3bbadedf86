//! Tavily search client.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{SearchError, SearchGateway, SearchResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn, Span};

/// Tavily's search endpoint.
pub const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// Tavily rejects queries over 400 characters; stay a little under.
const TAVILY_MAX_QUERY_CHARS: usize = 380;

/// Search category understood by Tavily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TavilyTopic {
    #[default]
    General,
    News,
    Finance,
}

/// Configuration for the Tavily client.
#[derive(Clone)]
pub struct TavilyConfig {
    pub api_key: String,
    pub endpoint: String,
    pub topic: TavilyTopic,
    /// Ask for full page text alongside the snippet.
    pub include_raw_content: bool,
    pub timeout: Duration,
}

impl TavilyConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: TAVILY_ENDPOINT.to_string(),
            topic: TavilyTopic::default(),
            include_raw_content: true,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set a custom endpoint (useful for testing).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_topic(mut self, topic: TavilyTopic) -> Self {
        self.topic = topic;
        self
    }

    #[must_use]
    pub fn with_raw_content(mut self, include: bool) -> Self {
        self.include_raw_content = include;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for TavilyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyConfig")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("topic", &self.topic)
            .field("include_raw_content", &self.include_raw_content)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Errors from the Tavily API.
#[derive(Debug, Error)]
pub enum TavilyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl From<TavilyError> for SearchError {
    fn from(err: TavilyError) -> Self {
        match err {
            TavilyError::Http(e) => SearchError::Transport(e.to_string()),
            TavilyError::Api { status, message } => SearchError::Provider { status, message },
            TavilyError::Parse(message) => SearchError::InvalidResponse(message),
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    topic: TavilyTopic,
    include_raw_content: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    raw_content: Option<String>,
}

impl From<TavilyResult> for SearchResult {
    fn from(result: TavilyResult) -> Self {
        Self {
            url: result.url,
            title: result.title.unwrap_or_default(),
            content: result.content.unwrap_or_default(),
            raw_content: result.raw_content.filter(|raw| !raw.trim().is_empty()),
        }
    }
}

/// Tavily-backed [`SearchGateway`].
#[derive(Debug, Clone)]
pub struct TavilyClient {
    config: TavilyConfig,
    client: Client,
}

impl TavilyClient {
    pub fn new(config: TavilyConfig) -> Result<Self, TavilyError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// Runs one search.
    #[instrument(
        name = "tavily_search",
        skip(self),
        fields(
            topic = ?self.config.topic,
            http.status_code = tracing::field::Empty,
            otel.kind = "client"
        )
    )]
    pub async fn search_raw(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, TavilyError> {
        let body = SearchRequest {
            query,
            max_results,
            topic: self.config.topic,
            include_raw_content: self.config.include_raw_content,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "search request failed");
                TavilyError::Http(err)
            })?;

        let status = response.status().as_u16();
        Span::current().record("http.status_code", status);

        if !response.status().is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            warn!(status, %message, "search API returned an error");
            return Err(TavilyError::Api { status, message });
        }

        let text = response.text().await?;
        let parsed: SearchResponse =
            serde_json::from_str(&text).map_err(|e| TavilyError::Parse(e.to_string()))?;

        let results: Vec<SearchResult> = parsed
            .results
            .into_iter()
            .map(SearchResult::from)
            .take(max_results)
            .collect();
        debug!(results = results.len(), "search completed");
        Ok(results)
    }
}

#[async_trait]
impl SearchGateway for TavilyClient {
    fn max_query_chars(&self) -> usize {
        TAVILY_MAX_QUERY_CHARS
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        Ok(self.search_raw(query, max_results).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_tavily_field_names() {
        let body = SearchRequest {
            query: "qubits",
            max_results: 3,
            topic: TavilyTopic::News,
            include_raw_content: true,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "query": "qubits",
                "max_results": 3,
                "topic": "news",
                "include_raw_content": true
            })
        );
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let result: TavilyResult =
            serde_json::from_str(r#"{"url": "https://a.example", "raw_content": "  "}"#).unwrap();
        let result = SearchResult::from(result);
        assert_eq!(result.title, "");
        assert_eq!(result.raw_content, None);
    }

    #[test]
    fn api_errors_keep_their_status() {
        let err: SearchError = TavilyError::Api {
            status: 432,
            message: "plan limit".into(),
        }
        .into();
        assert_eq!(
            err,
            SearchError::Provider {
                status: 432,
                message: "plan limit".into()
            }
        );
    }
}
