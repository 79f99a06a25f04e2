use std::error::Error as StdError;

use ralph_loop_model::ErrorKind;
use thiserror::Error;

use crate::engine_client::EngineFailure;

/// A boxed error returned by evaluators and engines.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors that end a ralph loop.
///
/// None of them is ever treated as an incomplete verdict: only a
/// well-formed negative [`Verdict`](crate::Verdict) continues the loop.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The loop was configured incorrectly. Returned before any iteration
    /// runs.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The engine failed to run a round.
    #[error("generation failed in iteration {iteration} ({kind}): {source}")]
    Generation {
        /// The iteration that failed.
        iteration: u32,
        /// The kind reported by the engine.
        kind: ErrorKind,
        /// The engine error.
        #[source]
        source: BoxError,
    },

    /// The evaluator failed or returned a malformed verdict.
    #[error("evaluation failed in iteration {iteration}: {source}")]
    Evaluation {
        /// The iteration being evaluated.
        iteration: u32,
        /// The evaluator error.
        #[source]
        source: BoxError,
    },

    /// The caller cancelled the loop.
    #[error("cancelled in iteration {iteration}")]
    Cancelled {
        /// The iteration in progress when cancellation was observed.
        iteration: u32,
    },
}

impl LoopError {
    pub(crate) fn generation(iteration: u32, failure: EngineFailure) -> Self {
        let (kind, source) = failure.into_parts();
        LoopError::Generation {
            iteration,
            kind,
            source,
        }
    }

    /// Returns the iteration the error happened in, if any.
    pub fn iteration(&self) -> Option<u32> {
        match self {
            LoopError::Configuration(_) => None,
            LoopError::Generation { iteration, .. }
            | LoopError::Evaluation { iteration, .. }
            | LoopError::Cancelled { iteration } => Some(*iteration),
        }
    }

    /// Returns `true` if the loop was cancelled by the caller.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoopError::Cancelled { .. })
    }
}
