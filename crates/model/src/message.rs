use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A turn in the conversation history.
///
/// The history only ever grows: the outer loop appends the engine's
/// response turns and its own feedback turns, and never rewrites them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "snake_case")]
pub enum Message {
    /// A user input text. Feedback from a negative verdict is also sent as
    /// a user turn.
    User(String),
    /// An assistant text.
    Assistant(String),
    /// A tool call requested by the assistant.
    ToolCall(ToolCallRequest),
    /// The result of a tool call.
    ToolResult(ToolCallResult),
}

impl Message {
    /// Returns the text of a user or assistant turn.
    #[inline]
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::User(text) | Message::Assistant(text) => Some(text),
            Message::ToolCall(_) | Message::ToolResult(_) => None,
        }
    }
}

/// Describes a tool call request from the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The name of the tool to call.
    pub name: String,
    /// The arguments to pass to the tool, usually a JSON object.
    pub arguments: Value,
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The output of the tool, or the error description if it failed.
    pub content: String,
    /// Whether the tool call failed.
    #[serde(default)]
    pub is_error: bool,
}
