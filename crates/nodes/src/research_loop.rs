//! The bounded research loop: Decide → ToolExecute → … → Compress.
//!
//! The model chooses tool calls; searches run concurrently and their results
//! are deduplicated by URL before each new page is summarized. The loop always
//! ends in Compress, which writes the report. Nothing in here fails the run:
//! tool and model errors are logged, counted, and reflected in the transcript.

use std::fmt::Write as _;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use pipeline::{
    dedupe_by_url, parse_summary_reply, truncate_query, CompletionRequest, LoopStage, Message,
    PipelineRunState, PromptBuilder, ResearchTool, RunLimits, SearchGateway, SearchResult,
    SourceUrl, SummarizedSource, TokenUsage, ToolCall, UniqueResults,
};
use tracing::{debug, info, instrument, warn};

use crate::gateway::LlmGateway;
use crate::report::{render_report, Synthesis};

/// Summarization calls in flight at once.
pub const SUMMARY_CONCURRENCY: usize = 4;

enum Decision {
    Execute(Vec<ToolCall>),
    Finish,
    Retry,
}

/// One research loop over borrowed collaborators.
pub struct ResearchLoop<'a> {
    model: &'a LlmGateway,
    search: &'a dyn SearchGateway,
    prompts: &'a PromptBuilder,
    limits: &'a RunLimits,
}

impl<'a> ResearchLoop<'a> {
    pub fn new(
        model: &'a LlmGateway,
        search: &'a dyn SearchGateway,
        prompts: &'a PromptBuilder,
        limits: &'a RunLimits,
    ) -> Self {
        Self {
            model,
            search,
            prompts,
            limits,
        }
    }

    /// Runs the loop for `scope`, leaving the report in
    /// `state.compressed_report`.
    #[instrument(skip_all, fields(run_id = %state.run_id, max_iterations = self.limits.max_iterations))]
    pub async fn run(&self, state: &mut PipelineRunState, scope: &str) {
        state.loop_messages = vec![
            Message::system(
                self.prompts
                    .research_system_prompt(state.date, self.limits.max_iterations),
            ),
            Message::user(scope),
        ];

        let mut next = if self.limits.max_iterations == 0 {
            LoopStage::Compress
        } else {
            LoopStage::Decide
        };
        let mut pending = Vec::new();

        loop {
            state.loop_history.push(next);
            debug!(stage = %next, iteration = state.iteration_count, "research loop step");

            next = match next {
                LoopStage::Decide => match self.decide(state).await {
                    Decision::Execute(calls) => {
                        pending = calls;
                        LoopStage::ToolExecute
                    }
                    Decision::Finish => LoopStage::Compress,
                    Decision::Retry => LoopStage::Decide,
                },
                LoopStage::ToolExecute => {
                    self.execute(state, std::mem::take(&mut pending)).await;
                    self.after_tools(state)
                }
                LoopStage::Compress => {
                    self.compress(state).await;
                    return;
                }
            };
        }
    }

    async fn decide(&self, state: &mut PipelineRunState) -> Decision {
        let request = CompletionRequest::new(state.loop_messages.clone())
            .with_tools(ResearchTool::specs());

        match self.model.complete(&request).await {
            Ok(reply) => {
                state.usage += reply.usage;
                if reply.has_tool_calls() {
                    debug!(calls = reply.tool_calls.len(), "model requested tools");
                    state.loop_messages.push(Message::assistant_with_tool_calls(
                        reply.content,
                        reply.tool_calls.clone(),
                    ));
                    Decision::Execute(reply.tool_calls)
                } else {
                    if !reply.content.trim().is_empty() {
                        state.loop_messages.push(Message::assistant(reply.content));
                    }
                    info!(iteration = state.iteration_count, "model finished researching");
                    Decision::Finish
                }
            }
            Err(err) => {
                state.error_count += 1;
                warn!(
                    error = %err,
                    consecutive_failures = state.error_count,
                    "decide step failed"
                );
                if state.error_count >= self.limits.max_consecutive_failures {
                    Decision::Finish
                } else {
                    Decision::Retry
                }
            }
        }
    }

    async fn execute(&self, state: &mut PipelineRunState, calls: Vec<ToolCall>) {
        let mut replies: Vec<Option<String>> = vec![None; calls.len()];
        let mut searches: Vec<(usize, String)> = Vec::new();
        let mut succeeded = 0usize;

        for (index, call) in calls.iter().enumerate() {
            match ResearchTool::from_call(call) {
                Ok(ResearchTool::Search { query }) => {
                    let sent = truncate_query(&query, self.search.max_query_chars());
                    if sent.len() < query.len() {
                        debug!(original = query.len(), sent = sent.len(), "query truncated");
                    }
                    state.queries.push(sent.clone());
                    searches.push((index, sent));
                }
                Ok(ResearchTool::Reflect { note }) => {
                    info!(note = %note, "reflection recorded");
                    replies[index] = Some(format!("Reflection recorded: {note}"));
                    succeeded += 1;
                }
                Err(err) => {
                    warn!(tool = %call.name, error = %err, "unusable tool call");
                    replies[index] = Some(format!("Tool call rejected: {err}"));
                }
            }
        }

        let max_results = self.limits.max_results_per_query;
        let responses = join_all(
            searches
                .iter()
                .map(|(_, query)| self.search.search(query, max_results)),
        )
        .await;

        let mut found: Vec<(usize, String, Vec<SearchResult>)> = Vec::new();
        for ((index, query), response) in searches.into_iter().zip(responses) {
            match response {
                Ok(results) => {
                    debug!(query = %query, results = results.len(), "search completed");
                    succeeded += 1;
                    found.push((index, query, results));
                }
                Err(err) => {
                    warn!(query = %query, error = %err, "search failed");
                    replies[index] = Some(format!(
                        "Search for \"{query}\" failed: {err}. No results were recorded."
                    ));
                }
            }
        }

        let unique = dedupe_by_url(found.iter().map(|(_, _, results)| results.clone()));
        self.summarize_new(state, unique).await;

        for (index, query, results) in &found {
            replies[*index] = Some(render_search_reply(query, results, &state.summaries));
        }
        for (call, reply) in calls.iter().zip(replies) {
            state
                .loop_messages
                .push(Message::tool_result(call.id.clone(), reply.unwrap_or_default()));
        }

        state.iteration_count += 1;
        if succeeded == 0 {
            state.error_count += 1;
            warn!(
                iteration = state.iteration_count,
                consecutive_failures = state.error_count,
                "every tool call in this step failed"
            );
        } else {
            state.error_count = 0;
        }
    }

    fn after_tools(&self, state: &PipelineRunState) -> LoopStage {
        if state.error_count >= self.limits.max_consecutive_failures {
            warn!(
                consecutive_failures = state.error_count,
                "failure budget exhausted; compressing"
            );
            LoopStage::Compress
        } else if state.iteration_count >= self.limits.max_iterations {
            info!(iterations = state.iteration_count, "iteration budget reached; compressing");
            LoopStage::Compress
        } else {
            LoopStage::Decide
        }
    }

    /// Summarizes every URL with page content not seen in an earlier
    /// iteration. Results with neither snippet nor page text never become
    /// sources.
    async fn summarize_new(&self, state: &mut PipelineRunState, unique: UniqueResults) {
        let fresh: Vec<(SourceUrl, SearchResult)> = unique
            .into_iter()
            .filter(|(url, _)| !state.summaries.contains_key(url))
            .filter(|(url, result)| {
                let has_content = !result.best_content().trim().is_empty();
                if !has_content {
                    debug!(url = %url, "skipping result without content");
                }
                has_content
            })
            .collect();
        if fresh.is_empty() {
            return;
        }

        let outcomes: Vec<(SummarizedSource, TokenUsage)> = stream::iter(fresh.iter())
            .map(|(url, result)| self.summarize(url, result))
            .buffered(SUMMARY_CONCURRENCY)
            .collect()
            .await;

        for (source, usage) in outcomes {
            state.usage += usage;
            state.sources.insert(source.url.clone());
            state.summaries.insert(source.url.clone(), source);
        }
    }

    async fn summarize(&self, url: &SourceUrl, result: &SearchResult) -> (SummarizedSource, TokenUsage) {
        let title = result.display_title().to_string();
        let content = result.best_content();
        let prompt = self
            .prompts
            .summarize_prompt(&title, content, self.limits.summary_char_budget);
        let request = CompletionRequest::new(vec![Message::user(prompt)]);

        match self.model.complete(&request).await {
            Ok(reply) => {
                let (summary, key_excerpts) = parse_summary_reply(&reply.content);
                let summary = if summary.is_empty() {
                    result.content.trim().to_string()
                } else {
                    summary
                };
                let source = SummarizedSource {
                    url: url.clone(),
                    title,
                    summary,
                    key_excerpts,
                };
                (source, reply.usage)
            }
            Err(err) => {
                warn!(url = %url, error = %err, "summarization failed");
                let source = SummarizedSource {
                    url: url.clone(),
                    title,
                    summary: format!("(summarization failed: {err})"),
                    key_excerpts: None,
                };
                (source, TokenUsage::default())
            }
        }
    }

    async fn compress(&self, state: &mut PipelineRunState) {
        state
            .loop_messages
            .push(Message::user(self.prompts.compress_instruction()));
        // Tools stay declared: providers reject transcripts holding tool calls
        // for tools the request does not offer.
        let request = CompletionRequest::new(state.loop_messages.clone())
            .with_tools(ResearchTool::specs());

        let failure = match self.model.complete(&request).await {
            Ok(reply) => {
                state.usage += reply.usage;
                let text = reply.content.trim().to_string();
                if !text.is_empty() {
                    state.loop_messages.push(Message::assistant(text.clone()));
                    state.synthesis = Some(text);
                }
                None
            }
            Err(err) => {
                warn!(error = %err, "compression call failed");
                Some(err.to_string())
            }
        };

        let synthesis = match (&state.synthesis, &failure) {
            (Some(text), _) => Synthesis::Written(text),
            (None, Some(reason)) => Synthesis::Unavailable(reason),
            (None, None) => Synthesis::Skipped,
        };
        let report = render_report(&state.queries, synthesis, &state.summaries);
        state.compressed_report = Some(report);

        info!(
            iterations = state.iteration_count,
            queries = state.queries.len(),
            sources = state.sources.len(),
            "research compressed"
        );
    }
}

/// Tool reply for one search call: its results with their summaries.
fn render_search_reply(
    query: &str,
    results: &[SearchResult],
    summaries: &IndexMap<SourceUrl, SummarizedSource>,
) -> String {
    if results.is_empty() {
        return format!("Search for \"{query}\" returned no results.");
    }

    let mut out = format!("Search results for \"{query}\":\n");
    for (index, result) in results.iter().enumerate() {
        let summary = SourceUrl::new(result.url.trim())
            .and_then(|url| summaries.get(&url))
            .map(|source| source.summary.as_str())
            .unwrap_or(result.content.as_str());
        let _ = write!(
            out,
            "\n[{}] {}\nURL: {}\nSummary: {}\n",
            index + 1,
            result.display_title(),
            result.url.trim(),
            summary.trim()
        );
    }
    out
}
