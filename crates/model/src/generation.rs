use std::ops::{Add, AddAssign};
use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::message::{Message, ToolCallRequest, ToolCallResult};

/// The reason why a step of a round has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model needs to call a tool.
    ToolCalls,
    /// The model has finished generating text.
    Stop,
    /// The model hit its output token limit.
    Length,
}

/// Token usage reported by the engine.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct Usage {
    /// Tokens sent to the model.
    pub input_tokens: u64,
    /// Tokens produced by the model.
    pub output_tokens: u64,
}

impl Usage {
    /// Returns the sum of input and output tokens.
    #[inline]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl Add for Usage {
    type Output = Usage;

    #[inline]
    fn add(self, rhs: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl AddAssign for Usage {
    #[inline]
    fn add_assign(&mut self, rhs: Usage) {
        *self = *self + rhs;
    }
}

/// The complete result of one generation round.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// All text the model produced during the round, concatenated.
    pub text: String,
    /// The response turns to append to the conversation history.
    pub messages: Vec<Message>,
    /// Number of steps (model calls) performed.
    pub steps: u32,
    /// Why the last step finished.
    pub finish_reason: Option<FinishReason>,
    /// Tokens used by the round.
    pub usage: Usage,
}

impl Generation {
    /// Creates a single-step, text-only generation.
    ///
    /// This is what a round degrades to when only its transcript is known.
    pub fn from_text<S: Into<String>>(text: S) -> Self {
        let text = text.into();
        Self {
            messages: vec![Message::Assistant(text.clone())],
            text,
            steps: 1,
            finish_reason: Some(FinishReason::Stop),
            usage: Usage::default(),
        }
    }
}

/// The event from a streaming round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RoundEvent {
    /// Received a text delta.
    TextDelta(String),
    /// The model requested a tool call.
    ToolCall(ToolCallRequest),
    /// A tool call has been executed.
    ToolResult(ToolCallResult),
    /// A step has finished.
    StepFinished(FinishReason),
}

/// A round that is being streamed by an engine.
pub trait RoundStream: Sized + Send + 'static {
    /// The error type that may be returned by the engine.
    type Error: EngineError;

    /// Attempts to pull out the next event from the round.
    ///
    /// # Return value
    ///
    /// - `Poll::Pending` means that the round is still waiting for the next
    ///   event. Implementations will ensure that the current task will be
    ///   notified when the next event may be ready.
    /// - `Poll::Ready(Ok(Some(event)))` means the round has an event to
    ///   deliver, and may produce further events on subsequent calls.
    /// - `Poll::Ready(Ok(None))` means the round has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while running
    ///   the round.
    ///
    /// Calling this method after completion should always return `None`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<RoundEvent>, Self::Error>>;

    /// Returns the complete [`Generation`] of this round.
    ///
    /// You should call this method after polling all events from the
    /// stream, and implementations should always return the same value for
    /// one round. `None` means the engine cannot assemble it; callers fall
    /// back to [`Generation::from_text`] with the drained text.
    fn generation(&self) -> Option<Generation> {
        None
    }
}
