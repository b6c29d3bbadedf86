//! Briefsmith LLM provider adapter.
//!
//! Implements [`pipeline::ModelGateway`] for any endpoint that speaks the
//! OpenAI chat-completions format. Gemini is the default through its
//! OpenAI-compatible surface; OpenAI itself, Ollama, vLLM and LM Studio work by
//! changing the base URL.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing and
//! the mapping of HTTP failures onto [`pipeline::RetryPolicy`] live here. The
//! [`pipeline`] crate sees only [`pipeline::ModelGateway`]; retry loops belong
//! to the orchestration layer, not to this adapter.

mod config;
mod error;
mod provider;
mod wire;

pub use config::{ProviderConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use error::ProviderError;
pub use provider::OpenAiCompatibleProvider;
