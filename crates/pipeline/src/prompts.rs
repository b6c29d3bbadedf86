//! Prompt rendering.
//!
//! Every builder here is a pure function of its arguments: the date is always
//! passed in, and the embedded JSON Schemas are generated once with stable key
//! order. Identical inputs therefore yield byte-identical prompt text.

use std::fmt::Write as _;

use crate::brief::{DELIVERABLES_BOUNDS, KEY_QUESTIONS_BOUNDS, METHOD_BRIEF_BOUNDS};
use crate::messages::Message;
use crate::schema::OutputSchema;
use crate::search::truncate_chars;
use crate::BriefDate;

/// Marker separating the summary from the excerpts in a summarization reply.
pub const KEY_EXCERPTS_MARKER: &str = "Key excerpts:";

/// Rendered instruction text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PromptText(String);

impl PromptText {
    /// Returns the text as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the prompt, returning the text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for PromptText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<PromptText> for String {
    fn from(prompt: PromptText) -> Self {
        prompt.0
    }
}

/// Renders every prompt the pipeline sends.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    brief_schema: String,
    clarify_schema: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    /// Creates a builder, rendering the output schemas once.
    pub fn new() -> Self {
        Self {
            brief_schema: OutputSchema::research_brief().to_pretty_json(),
            clarify_schema: OutputSchema::clarify_decision().to_pretty_json(),
        }
    }

    /// The instruction asking the model for a research brief on `topic`.
    pub fn build_brief_prompt(&self, topic: &str, date: BriefDate) -> PromptText {
        let mut text = String::new();
        let _ = writeln!(text, "You are a research assistant.");
        let _ = writeln!(
            text,
            "Today's date is {date}. Ensure your response reflects the most up-to-date information."
        );
        let _ = writeln!(text, "Create a concise research brief for the topic below.");
        let _ = writeln!(text);
        let _ = writeln!(
            text,
            "The output MUST be a single JSON object that validates against this JSON Schema:"
        );
        let _ = writeln!(text);
        let _ = writeln!(text, "{}", self.brief_schema);
        let _ = writeln!(text);
        let _ = writeln!(text, "Rules:");
        let _ = writeln!(text, "- title: short and descriptive.");
        let _ = writeln!(text, "- date: today's date ({date}), formatted YYYY-MM-DD.");
        let _ = writeln!(text, "- problem_statement: at most 2 sentences.");
        let _ = writeln!(text, "- key_questions: {KEY_QUESTIONS_BOUNDS}.");
        let _ = writeln!(text, "- method_brief: {METHOD_BRIEF_BOUNDS}.");
        let _ = writeln!(text, "- deliverables: {DELIVERABLES_BOUNDS}.");
        let _ = writeln!(
            text,
            "- Output ONLY the JSON object: no commentary, no markdown, no code fences."
        );
        let _ = writeln!(text);
        let _ = write!(text, "Topic: {}", topic.trim());
        PromptText(text)
    }

    /// The instruction asking the model whether `topic` needs clarifying,
    /// given the clarification exchange so far.
    pub fn build_clarify_prompt(
        &self,
        topic: &str,
        date: BriefDate,
        conversation: &[Message],
    ) -> PromptText {
        let mut text = String::new();
        let _ = writeln!(
            text,
            "You are scoping a research request before a research brief is written. \
             Today's date is {date}."
        );
        let _ = writeln!(text);
        let _ = writeln!(text, "Conversation so far:");
        if conversation.is_empty() {
            let _ = writeln!(text, "(none)");
        }
        for message in conversation {
            let _ = writeln!(text, "{}: {}", message.role, message.content.trim());
        }
        let _ = writeln!(text);
        let _ = writeln!(text, "Current topic: {}", topic.trim());
        let _ = writeln!(text);
        let _ = writeln!(
            text,
            "Decide whether ONE clarifying question is needed before planning. Ask only if \
             the topic is ambiguous, lacks essential scope, or uses unexplained acronyms. \
             Never ask for information the conversation already provides."
        );
        let _ = writeln!(text);
        let _ = writeln!(
            text,
            "Respond with a single JSON object that validates against this JSON Schema:"
        );
        let _ = writeln!(text);
        let _ = writeln!(text, "{}", self.clarify_schema);
        let _ = writeln!(text);
        let _ = writeln!(
            text,
            "- If a question is needed: need_clarification = true, question = the question, \
             verification = \"\"."
        );
        let _ = writeln!(
            text,
            "- Otherwise: need_clarification = false, question = \"\", verification = a short \
             message confirming that research will now start."
        );
        let _ = write!(
            text,
            "- Output ONLY the JSON object: no commentary, no markdown, no code fences."
        );
        PromptText(text)
    }

    /// System instruction for the research loop's decide step.
    pub fn research_system_prompt(&self, date: BriefDate, max_iterations: u32) -> PromptText {
        PromptText(format!(
            "You are a research assistant gathering web sources for the research scope the user \
             provides. Today's date is {date}.\n\
             \n\
             Available tools:\n\
             - search(query): web search. Use short, focused queries; at most three per turn.\n\
             - reflect(note): record what you have learned and what is still missing.\n\
             \n\
             You have at most {max_iterations} rounds of tool calls. When you have enough \
             material, or further searching is unlikely to help, reply without calling any tool."
        ))
    }

    /// Instruction appended before the final compression call.
    pub fn compress_instruction(&self) -> PromptText {
        PromptText(
            "Stop calling tools. Write the final research report for the scope above: the key \
             findings organised by the key questions, each claim citing the URL of the source \
             it came from. Use only sources that appear in the tool results; do not invent any."
                .to_string(),
        )
    }

    /// Instruction asking the model to summarize one page.
    ///
    /// `content` is cut to `char_budget` characters first so long pages stay
    /// within provider input limits.
    pub fn summarize_prompt(&self, title: &str, content: &str, char_budget: usize) -> PromptText {
        PromptText(format!(
            "You are a research assistant. Summarize the following webpage content concisely, \
             preserving key points, facts, and any important numbers or quotes. Keep the \
             summary short (about 3-6 sentences).\n\
             \n\
             Reply in this format:\n\
             Summary:\n\
             <the summary>\n\
             {KEY_EXCERPTS_MARKER}\n\
             <up to three short verbatim quotes, one per line, or \"none\">\n\
             \n\
             Title: {title}\n\
             \n\
             {}",
            truncate_chars(content, char_budget)
        ))
    }
}

/// Splits a summarization reply into its summary and optional excerpts.
///
/// Replies that ignore the requested format are taken whole as the summary.
pub fn parse_summary_reply(reply: &str) -> (String, Option<String>) {
    let (summary, excerpts) = match find_ignore_case(reply, KEY_EXCERPTS_MARKER) {
        Some(at) => (&reply[..at], Some(&reply[at + KEY_EXCERPTS_MARKER.len()..])),
        None => (reply, None),
    };

    let summary = summary.trim();
    let summary = summary
        .strip_prefix("Summary:")
        .or_else(|| summary.strip_prefix("SUMMARY:"))
        .unwrap_or(summary)
        .trim()
        .to_string();

    let excerpts = excerpts
        .map(str::trim)
        .filter(|e| !e.is_empty() && !e.eq_ignore_ascii_case("none"))
        .map(str::to_string);

    (summary, excerpts)
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}
