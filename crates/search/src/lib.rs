//! Briefsmith web search adapter.
//!
//! Implements [`pipeline::SearchGateway`] over the [Tavily](https://tavily.com)
//! search API, which returns page text alongside each result.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Request formatting, authentication and response
//! decoding live here. Query truncation and deduplication are domain rules and
//! stay in the [`pipeline`] crate; this adapter only reports its query limit.

mod tavily;

pub use tavily::{TavilyClient, TavilyConfig, TavilyError, TavilyTopic, TAVILY_ENDPOINT};
