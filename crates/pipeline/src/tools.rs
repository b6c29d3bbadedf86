//! The two tools offered to the model during the research loop.

use serde_json::json;

use crate::messages::{ToolCall, ToolSpec};

/// Name of the web search tool.
pub const SEARCH_TOOL: &str = "search";
/// Name of the reflection tool.
pub const REFLECT_TOOL: &str = "reflect";

/// A tool call the research loop knows how to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResearchTool {
    /// Run a web search.
    Search {
        /// Query text, before truncation.
        query: String,
    },
    /// Record a reflection on progress so far. Has no side effects beyond the
    /// transcript.
    Reflect {
        /// The model's note.
        note: String,
    },
}

/// Why a tool call could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolCallError {
    /// The model named a tool that was never offered.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    /// The arguments lack the required string field.
    #[error("tool '{tool}' requires a non-empty string argument '{argument}'")]
    MissingArgument {
        /// Tool name.
        tool: String,
        /// Missing argument name.
        argument: &'static str,
    },
}

impl ResearchTool {
    /// Interprets a model tool call.
    pub fn from_call(call: &ToolCall) -> Result<Self, ToolCallError> {
        match call.name.as_str() {
            SEARCH_TOOL => Ok(Self::Search {
                query: string_argument(call, "query")?,
            }),
            REFLECT_TOOL => Ok(Self::Reflect {
                note: string_argument(call, "note")?,
            }),
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }

    /// Definitions of both tools, in the order they are offered.
    pub fn specs() -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: SEARCH_TOOL.to_string(),
                description: "Search the web. Use short, focused queries; one topic per call."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "The search query." }
                    },
                    "required": ["query"]
                }),
            },
            ToolSpec {
                name: REFLECT_TOOL.to_string(),
                description: "Record a short reflection: what was found, what is missing, \
                              and whether to search again or stop."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "note": { "type": "string", "description": "The reflection." }
                    },
                    "required": ["note"]
                }),
            },
        ]
    }
}

fn string_argument(call: &ToolCall, argument: &'static str) -> Result<String, ToolCallError> {
    call.arguments
        .get(argument)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ToolCallError::MissingArgument {
            tool: call.name.clone(),
            argument,
        })
}
