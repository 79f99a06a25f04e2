use std::collections::VecDeque;

use ralph_loop_model::{
    FinishReason, ToolCallRequest, ToolStopCondition, Usage,
};
use serde::{Deserialize, Serialize};

/// The events in a preset round.
///
/// Steps are implicit: a run of tool calls ends a step, and the next text
/// delta starts a new one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "text_delta")]
    TextDelta(String),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallRequest),
}

/// The preset for one round.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetRound {
    /// Events in this round.
    pub events: Vec<PresetEvent>,
    /// If set, the round fails with this message instead.
    pub failure: Option<String>,
    /// Usage reported for the round.
    #[serde(default)]
    pub usage: Usage,
}

impl PresetRound {
    /// Creates a `PresetRound` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            ..Default::default()
        }
    }

    /// Creates a `PresetRound` answering with a single text delta.
    #[inline]
    pub fn with_text<S: Into<String>>(text: S) -> Self {
        Self::with_events([PresetEvent::TextDelta(text.into())])
    }

    /// Creates a `PresetRound` that fails with the given message.
    #[inline]
    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// Sets the usage reported for this round.
    #[inline]
    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = Usage {
            input_tokens,
            output_tokens,
        };
        self
    }
}

/// One thing the engine does while replaying a round.
#[derive(Clone, Debug)]
pub(crate) enum Action {
    Delta(String),
    Call(ToolCallRequest),
    EndStep(FinishReason),
}

/// Splits the events into steps and cuts the round where `tool_stop`
/// fires.
pub(crate) fn plan_actions(
    events: &[PresetEvent],
    tool_stop: &ToolStopCondition,
) -> VecDeque<Action> {
    let mut steps: Vec<(Vec<String>, Vec<ToolCallRequest>)> = vec![];
    let mut deltas = vec![];
    let mut calls = vec![];
    for event in events {
        match event {
            PresetEvent::TextDelta(delta) => {
                if !calls.is_empty() {
                    steps.push((
                        std::mem::take(&mut deltas),
                        std::mem::take(&mut calls),
                    ));
                }
                deltas.push(delta.clone());
            }
            PresetEvent::ToolCall(req) => calls.push(req.clone()),
        }
    }
    steps.push((deltas, calls));

    let mut actions = VecDeque::new();
    for (idx, (deltas, calls)) in steps.into_iter().enumerate() {
        let step = idx as u32 + 1;
        let stop = calls.is_empty() || tool_stop.should_stop(step, &calls);
        actions.extend(deltas.into_iter().map(Action::Delta));
        let reason = if calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };
        actions.extend(calls.into_iter().map(Action::Call));
        actions.push_back(Action::EndStep(reason));
        if stop {
            break;
        }
    }
    actions
}
