use std::fmt::{self, Display, Formatter};

use ralph_loop_model::{Generation, Usage};
use serde::{Deserialize, Serialize};

use crate::error::LoopError;
use crate::state::IterationRecord;

/// Why a loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionReason {
    /// The evaluator reported the task complete.
    Verified,
    /// The stop condition ended the loop before completion.
    MaxIterations,
    /// An error or cancellation ended the loop.
    Aborted,
}

impl Display for CompletionReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompletionReason::Verified => "verified",
            CompletionReason::MaxIterations => "max-iterations",
            CompletionReason::Aborted => "aborted",
        })
    }
}

/// The result of a loop invocation.
#[derive(Debug)]
pub struct LoopOutcome {
    /// Text of the last recorded generation.
    pub final_text: String,
    /// Index of the last attempted iteration.
    pub iterations: u32,
    /// Why the loop ended. This is the authoritative outcome signal.
    pub completion_reason: CompletionReason,
    /// The last verdict's reason, or the error message when aborted.
    pub reason: Option<String>,
    /// The last recorded generation.
    pub last_result: Option<Generation>,
    /// Records of all evaluated iterations.
    pub all_iteration_results: Vec<IterationRecord>,
    /// The error that aborted the loop.
    pub error: Option<LoopError>,
    /// Tokens used by all recorded iterations.
    pub usage: Usage,
}

impl LoopOutcome {
    /// Returns `true` if the evaluator reported the task complete.
    #[inline]
    pub fn is_verified(&self) -> bool {
        self.completion_reason == CompletionReason::Verified
    }

    /// Converts an aborted outcome into its error.
    pub fn into_result(mut self) -> Result<Self, LoopError> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}
