//! Console and file rendering of a finished run.

use std::fmt::Write as _;

use pipeline::{
    Message, PipelineStage, ResearchBrief, Role, RunFailure, RunOutcome, TokenUsage,
};
use serde::Serialize;

/// Markdown for the brief alone; also the body of exported `sampleN.md` files.
pub fn brief_markdown(brief: &ResearchBrief) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", brief.title());
    let _ = writeln!(out, "* Date: {}", brief.date());
    let _ = writeln!(out, "* Problem Statement: {}\n", brief.problem_statement());
    push_list(&mut out, "Key Questions", brief.key_questions());
    out.push('\n');
    push_list(&mut out, "Method Brief", brief.method_brief());
    out.push('\n');
    push_list(&mut out, "Deliverables", brief.deliverables());
    out
}

fn push_list(out: &mut String, heading: &str, items: &[String]) {
    let _ = writeln!(out, "## {heading}");
    for item in items {
        let _ = writeln!(out, "- {item}");
    }
}

/// Human-readable view of the whole run, successful or not.
pub fn outcome_markdown(outcome: &RunOutcome) -> String {
    let state = outcome.state();
    let mut out = String::new();

    match outcome {
        RunOutcome::Done { report, .. } => {
            out.push_str(&brief_markdown(&report.brief));
            push_conversation(&mut out, &state.conversation);
            let _ = writeln!(out, "\n## Research Scope\n{}", report.scope_statement);
            if !report.compressed_report.is_empty() {
                let _ = writeln!(out, "\n## Research Report\n{}", report.compressed_report);
            }
        }
        RunOutcome::Failed { failure, .. } => {
            let _ = writeln!(out, "# Run failed during {}\n", failure.stage());
            let _ = writeln!(out, "{failure}");
            if let RunFailure::Validation(invalid) = failure {
                out.push_str("\n## Offending fields\n");
                for issue in &invalid.issues {
                    let _ = writeln!(out, "- {issue}");
                }
                let _ = writeln!(out, "\n## Model output\n{}", invalid.raw);
            }
            push_conversation(&mut out, &state.conversation);
        }
    }

    push_usage(&mut out, state.usage);
    out.trim_end().to_string()
}

fn push_conversation(out: &mut String, conversation: &[Message]) {
    let turns: Vec<&Message> = conversation
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .collect();
    if turns.is_empty() {
        return;
    }
    out.push_str("\n## Conversation\n");
    for message in turns {
        let speaker = if message.role == Role::User { "You" } else { "Assistant" };
        let _ = writeln!(out, "**{speaker}:** {}", message.content);
    }
}

fn push_usage(out: &mut String, usage: TokenUsage) {
    let _ = writeln!(
        out,
        "\n_Tokens: {} prompt, {} completion, {} total_",
        usage.prompt,
        usage.completion,
        usage.total()
    );
}

/// Machine-readable view printed with `--json`.
#[derive(Debug, Serialize)]
pub struct RunView<'a> {
    pub run_id: String,
    pub started_at: String,
    pub stage: PipelineStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brief: Option<&'a ResearchBrief>,
    pub conversation: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_statement: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_report: Option<&'a str>,
    pub queries: &'a [String],
    pub sources: Vec<&'a str>,
    pub usage: TokenUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<&'a RunFailure>,
}

impl<'a> RunView<'a> {
    pub fn new(outcome: &'a RunOutcome) -> Self {
        let state = outcome.state();
        let report = outcome.report();
        Self {
            run_id: state.run_id.to_string(),
            started_at: state.started_at.to_string(),
            stage: state.stage,
            brief: report.map(|r| &r.brief),
            conversation: &state.conversation,
            scope_statement: state.scope_statement.as_deref(),
            compressed_report: report
                .map(|r| r.compressed_report.as_str())
                .filter(|text| !text.is_empty()),
            queries: &state.queries,
            sources: state.sources.iter().map(|url| url.as_str()).collect(),
            usage: state.usage,
            failure: outcome.failure(),
        }
    }
}

pub fn outcome_json(outcome: &RunOutcome) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&RunView::new(outcome))
}
