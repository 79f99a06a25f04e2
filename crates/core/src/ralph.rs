mod builder;
mod driver;
mod stream;
#[cfg(test)]
mod tests;

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use ralph_loop_model::{ToolSet, ToolStopCondition};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::engine_client::EngineClient;
use crate::evaluator::Evaluator;
use crate::observer::Observers;
use crate::outcome::LoopOutcome;
use crate::stop::StopCondition;
pub use builder::RalphLoopBuilder;
use driver::LoopDriver;
pub use stream::LoopStream;

/// Configuration shared by all invocations of a loop.
pub(crate) struct Shared {
    engine: EngineClient,
    model: String,
    instructions: Option<String>,
    tools: ToolSet,
    tool_stop: ToolStopCondition,
    evaluator: Evaluator,
    stop_when: Box<dyn StopCondition>,
    observers: Observers,
}

/// The input of one loop invocation.
#[derive(Clone, Debug)]
pub struct LoopInput {
    /// The original task.
    pub prompt: String,
    /// Cancels the invocation when triggered.
    pub cancellation: Option<CancellationToken>,
    /// Overrides the loop's inner stop condition for this invocation.
    pub tool_stop: Option<ToolStopCondition>,
}

impl LoopInput {
    /// Creates an input with the prompt.
    #[inline]
    pub fn new<S: Into<String>>(prompt: S) -> Self {
        Self {
            prompt: prompt.into(),
            cancellation: None,
            tool_stop: None,
        }
    }

    /// Attaches a cancellation token.
    #[inline]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Overrides the inner stop condition.
    #[inline]
    pub fn with_tool_stop(mut self, tool_stop: ToolStopCondition) -> Self {
        self.tool_stop = Some(tool_stop);
        self
    }
}

impl From<&str> for LoopInput {
    #[inline]
    fn from(prompt: &str) -> Self {
        Self::new(prompt)
    }
}

impl From<String> for LoopInput {
    #[inline]
    fn from(prompt: String) -> Self {
        Self::new(prompt)
    }
}

/// An iterate-then-verify agent loop.
///
/// Each invocation runs a generation round (the inner loop) on the
/// accumulated history, then asks the [`Evaluator`] whether the original
/// task is done. An incomplete verdict's feedback is appended as a user
/// turn and the next iteration starts, until the evaluator reports
/// completion or the stop condition ends the loop.
///
/// The loop itself holds no per-invocation state: clones share the same
/// configuration, and concurrent invocations are independent.
#[derive(Clone)]
pub struct RalphLoop {
    shared: Arc<Shared>,
}

impl RalphLoop {
    /// Runs the loop to the end.
    ///
    /// Errors never escape as `Err`: they end the loop with an
    /// [`Aborted`](crate::CompletionReason::Aborted) outcome carrying the
    /// error. Use [`LoopOutcome::into_result`] to get one.
    pub async fn run(&self, input: impl Into<LoopInput>) -> LoopOutcome {
        let driver = LoopDriver::new(Arc::clone(&self.shared), input.into());
        driver.run().instrument(info_span!("ralph loop")).await
    }

    /// Runs the loop and streams the final iteration.
    ///
    /// Iterations run exactly as in [`RalphLoop::run`]. Once an iteration
    /// would end the loop, it is discarded and re-issued in streaming mode;
    /// the returned [`LoopStream`] yields the events of that round. After
    /// the stream is drained, the streamed generation is evaluated again
    /// and the outcome becomes available.
    ///
    /// The streamed iteration is always the last one. If its verdict is
    /// incomplete, the outcome is
    /// [`MaxIterations`](crate::CompletionReason::MaxIterations) even when
    /// the first attempt was verified before the iteration bound was
    /// reached.
    ///
    /// If an iteration aborts before streaming starts, the returned stream
    /// is already finished.
    pub async fn stream(&self, input: impl Into<LoopInput>) -> LoopStream {
        let driver = LoopDriver::new(Arc::clone(&self.shared), input.into());
        driver
            .stream()
            .instrument(info_span!("ralph loop", streaming = true))
            .await
    }
}

impl Debug for RalphLoop {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RalphLoop")
            .field("model", &self.shared.model)
            .field("tools", &self.shared.tools)
            .field("evaluator", &self.shared.evaluator)
            .finish_non_exhaustive()
    }
}
