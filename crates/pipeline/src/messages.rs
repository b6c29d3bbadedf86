//! Role-tagged chat messages exchanged with the model.
//!
//! The shape is provider-neutral. Adapters translate it to their own wire
//! format (e.g. OpenAI-style `tool_calls` with JSON-string arguments).

use serde::{Deserialize, Serialize};

use crate::ToolCallId;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Instructions that frame the conversation.
    System,
    /// The human, or the pipeline speaking on the human's behalf.
    User,
    /// The model.
    Assistant,
    /// The result of a tool call requested by the model.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        };
        f.write_str(label)
    }
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call identifier.
    pub id: ToolCallId,
    /// Name of the requested tool.
    pub name: String,
    /// Decoded JSON arguments. Adapters store undecodable argument text as a
    /// JSON string so the core can report it.
    pub arguments: serde_json::Value,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author of the message.
    pub role: Role,
    /// Text content. May be empty for assistant messages that only carry tool calls.
    pub content: String,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For [`Role::Tool`] messages, the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<ToolCallId>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// A system instruction.
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    /// An assistant message without tool calls.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// An assistant message that requested tool calls.
    pub fn assistant_with_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// The result of the tool call identified by `call_id`.
    pub fn tool_result(call_id: ToolCallId, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// Description of a tool the model may call, with a JSON Schema for its
/// arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name as the model must spell it.
    pub name: String,
    /// What the tool does, in words the model can act on.
    pub description: String,
    /// JSON Schema of the argument object.
    pub parameters: serde_json::Value,
}
