//! Briefsmith orchestration: the research pipeline, its research loop, and
//! the LLM gateway every model call goes through.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Code here sequences calls between business logic
//! in the [`pipeline`] crate and the port traits (model, search, clarifier).
//! It contains no domain rules of its own and no provider-specific code.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`research_pipeline`] | `ResearchPipeline`: Clarify → … → Done / Failed |
//! | [`research_loop`] | `ResearchLoop`: Decide → ToolExecute → Compress |
//! | [`gateway`] | `LlmGateway`: retry budget, rate limit and call logging |
//! | [`report`] | Plain-text report assembly |

pub mod gateway;
pub mod report;
pub mod research_loop;
pub mod research_pipeline;

pub use gateway::{LlmGateway, RateLimiter, RetryConfig};
pub use report::{render_report, Synthesis, NO_SOURCES_NOTICE};
pub use research_loop::{ResearchLoop, SUMMARY_CONCURRENCY};
pub use research_pipeline::ResearchPipeline;
