//! [`ModelGateway`] over an OpenAI-compatible `/chat/completions` endpoint.

use async_trait::async_trait;
use pipeline::{
    CompletionRequest, Message, ModelError, ModelGateway, ModelName, ModelReply, OutputSchema,
    RawOutput, StructuredReply, ToolSpec,
};
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn, Span};

use crate::config::ProviderConfig;
use crate::error::{parse_retry_after, ProviderError};
use crate::wire::{
    sanitize_schema, ChatRequest, ChatResponse, JsonSchemaFormat, ResponseFormat, WireMessage,
    WireTool,
};

/// Chat-completions client for Gemini, OpenAI and compatible servers.
///
/// Each call is a single HTTP attempt; failures are classified with a
/// [`pipeline::RetryPolicy`] and left to the caller to retry.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAiCompatibleProvider {
    /// Builds the HTTP client with the configured timeout.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn request<'a>(&'a self, messages: &[Message], tools: &'a [ToolSpec]) -> ChatRequest<'a> {
        ChatRequest {
            model: self.config.model.as_str(),
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_output_tokens,
            response_format: None,
        }
    }

    #[instrument(
        name = "chat_completion",
        skip_all,
        fields(
            model = %self.config.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            structured = body.response_format.is_some(),
            http.status_code = tracing::field::Empty,
            otel.kind = "client"
        )
    )]
    async fn send(&self, body: &ChatRequest<'_>) -> Result<ModelReply, ProviderError> {
        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "completion request failed");
                ProviderError::Http(err)
            })?;

        let status = response.status();
        Span::current().record("http.status_code", status.as_u16());

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            warn!(status = status.as_u16(), %message, "provider returned an error");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
                retry_after,
            });
        }

        let text = response.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::Decode(e.to_string()))?;
        let reply = parsed
            .into_reply()
            .ok_or_else(|| ProviderError::Decode("response has no choices".to_string()))?;

        debug!(
            tool_calls = reply.tool_calls.len(),
            prompt_tokens = reply.usage.prompt.as_u64(),
            completion_tokens = reply.usage.completion.as_u64(),
            "completion decoded"
        );
        Ok(reply)
    }
}

#[async_trait]
impl ModelGateway for OpenAiCompatibleProvider {
    fn model_name(&self) -> ModelName {
        self.config.model.clone()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply, ModelError> {
        let body = self.request(&request.messages, &request.tools);
        Ok(self.send(&body).await?)
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<StructuredReply, ModelError> {
        let mut body = self.request(messages, &[]);
        if self.config.structured_output {
            body.response_format = Some(ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &schema.name,
                    schema: sanitize_schema(&schema.schema),
                    strict: false,
                },
            });
        }

        let reply = self.send(&body).await?;
        Ok(StructuredReply {
            output: structured_output(reply.content),
            usage: reply.usage,
        })
    }
}

/// Decoded object when the content is exactly a JSON object, raw text
/// otherwise (the validator extracts objects from fenced or chatty text).
fn structured_output(content: String) -> RawOutput {
    match serde_json::from_str::<Value>(content.trim()) {
        Ok(Value::Object(map)) => RawOutput::Object(map),
        _ => RawOutput::Text(content),
    }
}
