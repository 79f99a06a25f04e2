use serde::{Deserialize, Serialize};

use crate::message::{Message, ToolCallRequest};
use crate::tool::ToolSet;

/// A request for one bounded generation round.
#[derive(Clone, Debug)]
pub struct RoundRequest {
    /// Identifier of the model to run the round with.
    pub model: String,
    /// The system instructions, if any.
    pub instructions: Option<String>,
    /// The accumulated conversation history.
    pub messages: Vec<Message>,
    /// Tools that are available to the model. May be empty.
    pub tools: ToolSet,
    /// When the engine should end the round.
    pub tool_stop: ToolStopCondition,
}

/// The inner-loop bound: decides when an engine ends its round.
///
/// A round always ends when the model answers without requesting a tool.
/// This condition additionally cuts it short while the model still wants
/// to call tools. It is checked after every step (one model call plus the
/// tool calls it requested).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolStopCondition {
    /// Stop after the given number of steps.
    StepCountIs(u32),
    /// Stop once the model has called the named tool.
    HasToolCall(String),
}

impl ToolStopCondition {
    /// Returns `true` if the round should end after `steps` steps, where
    /// `last_tool_calls` are the calls requested in the latest step.
    pub fn should_stop(
        &self,
        steps: u32,
        last_tool_calls: &[ToolCallRequest],
    ) -> bool {
        match self {
            ToolStopCondition::StepCountIs(max) => steps >= *max,
            ToolStopCondition::HasToolCall(name) => {
                last_tool_calls.iter().any(|call| &call.name == name)
            }
        }
    }
}

impl Default for ToolStopCondition {
    #[inline]
    fn default() -> Self {
        ToolStopCondition::StepCountIs(20)
    }
}
