//! Port traits: everything the pipeline needs from the outside world.
//!
//! Infrastructure crates implement these traits; the orchestration layer
//! receives them as `Arc<dyn …>` from the composition root. Nothing in this
//! crate constructs a client or reads credentials.
//!
//! | Port | Implemented by |
//! |------|----------------|
//! | [`ModelGateway`] | `llm::OpenAiCompatibleProvider` |
//! | [`SearchGateway`] | `search::TavilyClient` |
//! | [`Clarifier`] | the CLI's console prompt, or test stubs |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{Message, ToolCall, ToolSpec};
use crate::schema::{OutputSchema, RawOutput};
use crate::search::SearchResult;
use crate::{ModelName, RetryPolicy, TokenUsage};

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Failures surfaced by a [`ModelGateway`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ModelError {
    /// The provider could not be reached, rejected the credentials, or
    /// rate-limited the request.
    #[error("model transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
        /// Whether and when the request may be repeated.
        retry: RetryPolicy,
    },

    /// The provider answered, but the payload does not have the expected shape.
    ///
    /// Never retried automatically: repeating an identical prompt rarely
    /// fixes a shape error.
    #[error("model output did not match the expected shape: {message}")]
    SchemaMismatch {
        /// What was wrong.
        message: String,
        /// The payload as received.
        raw: String,
    },
}

impl ModelError {
    /// The retry policy implied by this error.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Transport { retry, .. } => retry.clone(),
            Self::SchemaMismatch { .. } => RetryPolicy::NonRetryable,
        }
    }
}

/// A free-form completion request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Conversation so far, oldest first.
    pub messages: Vec<Message>,
    /// Tools the model may call. Empty means plain completion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
}

impl CompletionRequest {
    /// A request without tools.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
        }
    }

    /// Adds tool definitions to the request.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }
}

/// A model reply to a [`CompletionRequest`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelReply {
    /// Text content (may be empty when only tool calls were returned).
    pub content: String,
    /// Tool calls requested by the model, in the order given.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Token usage reported by the provider.
    #[serde(default)]
    pub usage: TokenUsage,
}

impl ModelReply {
    /// A plain text reply with no tool calls and no usage data.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if the model asked for at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A structured reply: the raw output plus usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReply {
    /// Decoded object, or text that still needs extraction and validation.
    pub output: RawOutput,
    /// Token usage reported by the provider.
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Access to a hosted language model.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// The model this gateway talks to, for logging.
    fn model_name(&self) -> ModelName;

    /// Free-form completion, optionally with tools.
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply, ModelError>;

    /// Best-effort structured completion into `schema`.
    ///
    /// Providers that cannot decode into a schema natively keep this default,
    /// which falls back to [`Self::complete`] and returns the reply text for
    /// the core to extract and validate.
    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<StructuredReply, ModelError> {
        let _ = schema;
        let reply = self
            .complete(&CompletionRequest::new(messages.to_vec()))
            .await?;
        Ok(StructuredReply {
            output: RawOutput::Text(reply.content),
            usage: reply.usage,
        })
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Failures surfaced by a [`SearchGateway`]. The core absorbs them: a failed
/// query contributes zero results.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SearchError {
    /// The provider could not be reached.
    #[error("search transport error: {0}")]
    Transport(String),

    /// The provider answered with an error status.
    #[error("search provider error (status {status}): {message}")]
    Provider {
        /// HTTP status code.
        status: u16,
        /// Error body or description.
        message: String,
    },

    /// The provider's response could not be decoded.
    #[error("invalid search response: {0}")]
    InvalidResponse(String),
}

/// Access to a web search provider.
#[async_trait]
pub trait SearchGateway: Send + Sync {
    /// Longest query (in characters) the provider accepts. The core truncates
    /// queries to this before calling [`Self::search`].
    fn max_query_chars(&self) -> usize {
        crate::search::DEFAULT_MAX_QUERY_CHARS
    }

    /// Runs one query, returning at most `max_results` results.
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchResult>, SearchError>;
}

// ---------------------------------------------------------------------------
// Human clarification
// ---------------------------------------------------------------------------

/// Failures surfaced by a [`Clarifier`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClarifyError {
    /// No human is available to answer (non-interactive run, closed input).
    #[error("clarifier unavailable: {0}")]
    Unavailable(String),
}

/// Asks a human a clarifying question and returns the answer.
///
/// The pipeline awaits the answer, bounded by its configured timeout; it
/// never assumes a particular I/O channel.
#[async_trait]
pub trait Clarifier: Send + Sync {
    /// Poses `question` and waits for an answer.
    async fn ask(&self, question: &str) -> Result<String, ClarifyError>;
}
