//! Run state threaded through the state machine, its stages, its limits, and
//! the terminal outcome handed back to callers.

use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::brief::{ClarifyDecision, ResearchBrief};
use crate::errors::RunFailure;
use crate::messages::Message;
use crate::schema::RawOutput;
use crate::search::SummarizedSource;
use crate::{BriefDate, PipelineRunId, SourceUrl, Timestamp, TokenUsage};

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// States of the research pipeline.
///
/// `Done` and `Failed` are terminal: no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Clarify,
    GenerateBrief,
    ParseBrief,
    BuildScope,
    ResearchLoop,
    Done,
    Failed,
}

impl PipelineStage {
    /// Returns `true` for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Clarify => "clarify",
            Self::GenerateBrief => "generate_brief",
            Self::ParseBrief => "parse_brief",
            Self::BuildScope => "build_scope",
            Self::ResearchLoop => "research_loop",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// States of the research loop sub-machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStage {
    Decide,
    ToolExecute,
    Compress,
}

impl std::fmt::Display for LoopStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Decide => "decide",
            Self::ToolExecute => "tool_execute",
            Self::Compress => "compress",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Budgets that keep every run finite.
///
/// Deserialisable so the CLI can read them straight from the `[limits]`
/// table of its configuration file; absent keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunLimits {
    /// Clarification rounds allowed before the run fails with an input error.
    pub max_clarify_rounds: u32,
    /// How long to wait for a single clarification answer.
    #[serde(with = "duration_secs")]
    pub clarify_timeout: Duration,
    /// Tool-execution rounds in the research loop before compression is forced.
    pub max_iterations: u32,
    /// Consecutive failed loop steps before compression is forced.
    pub max_consecutive_failures: u32,
    /// Results requested per search query.
    pub max_results_per_query: usize,
    /// Characters of page content sent for summarization.
    pub summary_char_budget: usize,
    /// Whether to run the research loop at all. When `false` the run finishes
    /// after the scope statement is built.
    pub research_enabled: bool,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_clarify_rounds: 3,
            clarify_timeout: Duration::from_secs(300),
            max_iterations: 3,
            max_consecutive_failures: 3,
            max_results_per_query: 3,
            summary_char_budget: 5000,
            research_enabled: true,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// The mutable context threaded through one run.
///
/// Only the controlling task mutates it; concurrent sub-calls return values
/// that are merged here after they complete.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunState {
    pub run_id: PipelineRunId,
    pub started_at: Timestamp,
    pub stage: PipelineStage,
    /// Every stage entered, in order, starting with `Clarify`.
    pub history: Vec<PipelineStage>,
    /// Research loop stages entered, in order.
    pub loop_history: Vec<LoopStage>,
    /// Current topic; replaced by each clarification answer.
    pub topic: String,
    pub date: BriefDate,
    /// Clarification exchange (questions, answers, verification message).
    pub conversation: Vec<Message>,
    /// The most recent decision, kept for routing.
    pub clarify_decision: Option<ClarifyDecision>,
    pub clarify_rounds: u32,
    /// Output of the brief call before validation.
    pub raw_brief: Option<RawOutput>,
    pub brief: Option<ResearchBrief>,
    pub scope_statement: Option<String>,
    pub loop_messages: Vec<Message>,
    pub iteration_count: u32,
    /// Consecutive failed loop steps; reset by any success.
    pub error_count: u32,
    /// Search queries actually sent, after truncation, in order.
    pub queries: Vec<String>,
    /// One entry per summarized source, in first-seen order.
    pub summaries: IndexMap<SourceUrl, SummarizedSource>,
    /// The model's final synthesis, if the compression call succeeded.
    pub synthesis: Option<String>,
    pub compressed_report: Option<String>,
    pub sources: IndexSet<SourceUrl>,
    pub usage: TokenUsage,
}

impl PipelineRunState {
    /// Fresh state for a run on `topic` anchored to `date`.
    pub fn new(topic: impl Into<String>, date: BriefDate) -> Self {
        Self {
            run_id: PipelineRunId::new_random(),
            started_at: Timestamp::now(),
            stage: PipelineStage::Clarify,
            history: vec![PipelineStage::Clarify],
            loop_history: Vec::new(),
            topic: topic.into(),
            date,
            conversation: Vec::new(),
            clarify_decision: None,
            clarify_rounds: 0,
            raw_brief: None,
            brief: None,
            scope_statement: None,
            loop_messages: Vec::new(),
            iteration_count: 0,
            error_count: 0,
            queries: Vec::new(),
            summaries: IndexMap::new(),
            synthesis: None,
            compressed_report: None,
            sources: IndexSet::new(),
            usage: TokenUsage::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What a successful run hands back to a CLI or UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchReport {
    pub brief: ResearchBrief,
    pub scope_statement: String,
    /// Empty when research was disabled.
    pub compressed_report: String,
    /// Cited source URLs in first-seen order.
    pub sources: Vec<String>,
}

/// Terminal result of a run. Always returned; the pipeline never panics or
/// propagates errors past its entry point.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The run reached `Done`.
    Done {
        /// The report.
        report: ResearchReport,
        /// Final state snapshot.
        state: Box<PipelineRunState>,
    },
    /// The run reached `Failed`.
    Failed {
        /// Why.
        failure: RunFailure,
        /// Final state snapshot; holds whatever was produced before the failure.
        state: Box<PipelineRunState>,
    },
}

impl RunOutcome {
    /// The terminal stage.
    pub fn stage(&self) -> PipelineStage {
        self.state().stage
    }

    /// Final state snapshot.
    pub fn state(&self) -> &PipelineRunState {
        match self {
            Self::Done { state, .. } | Self::Failed { state, .. } => state,
        }
    }

    /// The report, if the run succeeded.
    pub fn report(&self) -> Option<&ResearchReport> {
        match self {
            Self::Done { report, .. } => Some(report),
            Self::Failed { .. } => None,
        }
    }

    /// The failure, if the run failed.
    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            Self::Done { .. } => None,
            Self::Failed { failure, .. } => Some(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_fill_missing_keys_with_defaults() {
        let limits: RunLimits =
            serde_json::from_str(r#"{"max_iterations": 1, "clarify_timeout": 5}"#).unwrap();
        assert_eq!(limits.max_iterations, 1);
        assert_eq!(limits.clarify_timeout, Duration::from_secs(5));
        assert_eq!(limits.max_consecutive_failures, 3);
        assert!(limits.research_enabled);
    }

    #[test]
    fn only_done_and_failed_are_terminal() {
        assert!(PipelineStage::Done.is_terminal());
        assert!(PipelineStage::Failed.is_terminal());
        assert!(!PipelineStage::ResearchLoop.is_terminal());
    }
}
