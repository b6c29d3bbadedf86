//! Core research domain for Briefsmith.
//!
//! This crate contains every domain concept used throughout the workspace: the
//! research brief and its validator, prompt rendering, run state, and the port
//! traits that infrastructure crates implement. Infrastructure crates never add
//! domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`PipelineRunId`, `SourceUrl`, …) |
//! | [`types`] | Value types (`TokenUsage`, `BriefDate`, `Timestamp`) |
//! | [`brief`] | `ResearchBrief`, `ClarifyDecision`, list bounds, scope statement |
//! | [`schema`] | JSON extraction, brief validation, output schemas |
//! | [`prompts`] | `PromptBuilder` and summary-reply parsing |
//! | [`messages`] | Role-tagged chat messages, tool calls, tool specs |
//! | [`tools`] | The `search` and `reflect` research tools |
//! | [`search`] | Search results, URL deduplication, length guards |
//! | [`ports`] | `ModelGateway`, `SearchGateway`, `Clarifier` |
//! | [`state`] | Run state, stages, limits, terminal outcome |
//! | [`errors`] | Retry policy, input errors, terminal failure payload |

pub mod brief;
pub mod errors;
pub mod identifiers;
pub mod messages;
pub mod ports;
pub mod prompts;
pub mod schema;
pub mod search;
pub mod state;
pub mod tools;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use brief::{
    ClarifyDecision, ListBounds, ResearchBrief, DELIVERABLES_BOUNDS, KEY_QUESTIONS_BOUNDS,
    METHOD_BRIEF_BOUNDS,
};
pub use errors::{InputError, RetryPolicy, RunFailure};
pub use identifiers::{ModelName, PipelineRunId, SourceUrl, ToolCallId};
pub use messages::{Message, Role, ToolCall, ToolSpec};
pub use ports::{
    Clarifier, ClarifyError, CompletionRequest, ModelError, ModelGateway, ModelReply,
    SearchError, SearchGateway, StructuredReply,
};
pub use prompts::{parse_summary_reply, PromptBuilder, PromptText};
pub use schema::{
    decode_clarify_decision, extract_json_object, validate_brief, FieldIssue, OutputSchema,
    RawOutput, ValidationFailure,
};
pub use search::{
    dedupe_by_url, truncate_chars, truncate_query, SearchResult, SummarizedSource, UniqueResults,
};
pub use state::{
    LoopStage, PipelineRunState, PipelineStage, ResearchReport, RunLimits, RunOutcome,
};
pub use tools::{ResearchTool, ToolCallError};
pub use types::{BriefDate, Timestamp, TokenCount, TokenUsage};
