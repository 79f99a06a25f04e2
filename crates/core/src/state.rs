use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use ralph_loop_model::{Generation, Message, Usage};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::verdict::Verdict;

/// Where a loop invocation currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoopStage {
    /// Not started yet.
    #[default]
    Idle,
    /// Waiting for the engine to finish a round.
    Running,
    /// Waiting for the evaluator.
    Evaluating,
    /// The evaluator reported completion.
    Completed,
    /// The stop condition ended the loop.
    MaxIterationsReached,
    /// An error or cancellation ended the loop.
    Aborted,
}

impl Display for LoopStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopStage::Idle => "idle",
            LoopStage::Running => "running",
            LoopStage::Evaluating => "evaluating",
            LoopStage::Completed => "completed",
            LoopStage::MaxIterationsReached => "max iterations reached",
            LoopStage::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What happened in one iteration of the loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    /// 1-based index of the iteration.
    pub iteration: u32,
    /// The result of the inner loop.
    pub generation: Generation,
    /// The evaluator's verdict. `None` if evaluation failed or was
    /// cancelled.
    pub verdict: Option<Verdict>,
    /// Wall-clock time spent on the iteration.
    pub duration: Duration,
}

/// The state owned by one loop invocation.
///
/// Stop conditions receive it read-only after every evaluated iteration
/// that was not reported complete.
#[derive(Clone, Debug)]
pub struct LoopState {
    prompt: String,
    messages: Vec<Message>,
    iterations: Vec<IterationRecord>,
    started_at: Instant,
    stage: LoopStage,
}

impl LoopState {
    pub(crate) fn new(prompt: String) -> Self {
        Self {
            messages: vec![Message::User(prompt.clone())],
            prompt,
            iterations: vec![],
            started_at: Instant::now(),
            stage: LoopStage::Idle,
        }
    }

    /// The original prompt.
    #[inline]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The conversation history, starting with the prompt.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Records of all evaluated iterations so far.
    #[inline]
    pub fn iterations(&self) -> &[IterationRecord] {
        &self.iterations
    }

    /// Number of recorded iterations.
    #[inline]
    pub fn iteration_count(&self) -> u32 {
        self.iterations.len() as u32
    }

    /// Time since the loop started.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Tokens used by all recorded iterations.
    pub fn total_usage(&self) -> Usage {
        self.iterations
            .iter()
            .fold(Usage::default(), |acc, record| {
                acc + record.generation.usage
            })
    }

    /// The current stage.
    #[inline]
    pub fn stage(&self) -> LoopStage {
        self.stage
    }

    pub(crate) fn set_stage(&mut self, stage: LoopStage) {
        if self.stage != stage {
            debug!("loop stage: {} -> {}", self.stage, stage);
            self.stage = stage;
        }
    }

    pub(crate) fn append_generation(&mut self, generation: &Generation) {
        if !generation.messages.is_empty() {
            self.messages.extend(generation.messages.iter().cloned());
        } else if !generation.text.is_empty() {
            // Downgrade to a text-only turn.
            self.messages
                .push(Message::Assistant(generation.text.clone()));
        }
    }

    pub(crate) fn append_feedback(&mut self, feedback: &str) {
        self.messages.push(Message::User(feedback.to_owned()));
    }

    pub(crate) fn push_record(&mut self, record: IterationRecord) {
        debug_assert_eq!(record.iteration, self.iteration_count() + 1);
        self.iterations.push(record);
    }

    #[inline]
    pub(crate) fn last_record(&self) -> Option<&IterationRecord> {
        self.iterations.last()
    }

    #[inline]
    pub(crate) fn into_records(self) -> Vec<IterationRecord> {
        self.iterations
    }
}
