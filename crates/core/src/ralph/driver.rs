use std::sync::Arc;

use ralph_loop_model::{Generation, RoundRequest, ToolStopCondition};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::stream::LoopStream;
use super::{LoopInput, Shared};
use crate::engine_client::BoxRoundStream;
use crate::error::LoopError;
use crate::evaluator::{EvaluationInput, JudgeContext};
use crate::outcome::{CompletionReason, LoopOutcome};
use crate::state::{IterationRecord, LoopStage, LoopState};
use crate::verdict::Verdict;

enum Step {
    Continue,
    Finished(CompletionReason),
}

/// Drives one loop invocation.
pub(super) struct LoopDriver {
    shared: Arc<Shared>,
    state: LoopState,
    cancel: CancellationToken,
    tool_stop: ToolStopCondition,
    /// Index of the last attempted iteration.
    attempted: u32,
    /// Whether terminal iterations will be discarded and re-issued.
    rehearsing: bool,
}

impl LoopDriver {
    pub(super) fn new(shared: Arc<Shared>, input: LoopInput) -> Self {
        let LoopInput {
            prompt,
            cancellation,
            tool_stop,
        } = input;
        let tool_stop = tool_stop.unwrap_or_else(|| shared.tool_stop.clone());
        Self {
            state: LoopState::new(prompt),
            cancel: cancellation.unwrap_or_default(),
            tool_stop,
            shared,
            attempted: 0,
            rehearsing: false,
        }
    }

    pub(super) async fn run(mut self) -> LoopOutcome {
        info!("starting the loop on `{}`", self.shared.model);
        loop {
            match self.step().await {
                Ok(Step::Continue) => {}
                Ok(Step::Finished(reason)) => return self.finish(reason, None),
                Err(err) => {
                    return self.finish(CompletionReason::Aborted, Some(err));
                }
            }
        }
    }

    pub(super) async fn stream(mut self) -> LoopStream {
        info!("starting the loop on `{}` in streaming mode", self.shared.model);
        self.rehearsing = true;
        loop {
            let checkpoint = self.state.clone();
            match self.step().await {
                Ok(Step::Continue) => {}
                Ok(Step::Finished(reason)) => {
                    debug!(
                        "iteration {} resolved as {reason}, re-issuing it as a stream",
                        self.attempted
                    );
                    self.state = checkpoint;
                    break;
                }
                Err(err) => {
                    let outcome =
                        self.finish(CompletionReason::Aborted, Some(err));
                    return LoopStream::finished(outcome);
                }
            }
        }
        self.rehearsing = false;

        match self.open_stream().await {
            Ok((iteration, started, round)) => {
                LoopStream::new(self, iteration, started, round)
            }
            Err(err) => LoopStream::finished(
                self.finish(CompletionReason::Aborted, Some(err)),
            ),
        }
    }

    /// Evaluates and records the streamed iteration, then ends the loop.
    pub(super) async fn finish_streamed(
        mut self,
        iteration: u32,
        started: Instant,
        generation: Generation,
    ) -> LoopOutcome {
        match self.evaluate(iteration, generation, started).await {
            Ok(verdict) => {
                self.notify_recorded();
                let reason = if verdict.complete {
                    CompletionReason::Verified
                } else {
                    CompletionReason::MaxIterations
                };
                self.finish(reason, None)
            }
            Err(err) => self.finish(CompletionReason::Aborted, Some(err)),
        }
    }

    pub(super) fn finish(
        mut self,
        reason: CompletionReason,
        error: Option<LoopError>,
    ) -> LoopOutcome {
        self.state.set_stage(match reason {
            CompletionReason::Verified => LoopStage::Completed,
            CompletionReason::MaxIterations => LoopStage::MaxIterationsReached,
            CompletionReason::Aborted => LoopStage::Aborted,
        });

        let iterations = self.attempted.max(1);
        let usage = self.state.total_usage();
        let records = self.state.into_records();
        let last_result = records.last().map(|record| record.generation.clone());
        let reason_text = match &error {
            Some(err) => {
                error!("loop aborted: {err}");
                Some(err.to_string())
            }
            None => {
                info!(
                    "loop finished after {iterations} iteration(s): {reason}"
                );
                records
                    .last()
                    .and_then(|record| record.verdict.as_ref())
                    .and_then(|verdict| verdict.reason.clone())
            }
        };

        let outcome = LoopOutcome {
            final_text: last_result
                .as_ref()
                .map(|generation| generation.text.clone())
                .unwrap_or_default(),
            iterations,
            completion_reason: reason,
            reason: reason_text,
            last_result,
            all_iteration_results: records,
            error,
            usage,
        };
        self.shared.observers.finish(&outcome);
        outcome
    }

    #[inline]
    pub(super) fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn step(&mut self) -> Result<Step, LoopError> {
        let iteration = self.begin_iteration()?;
        let started = Instant::now();
        let round = self.shared.engine.run_round(self.round_request());
        let generation = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(LoopError::Cancelled { iteration });
            }
            result = round => result
                .map_err(|failure| LoopError::generation(iteration, failure))?,
        };

        let verdict = self.evaluate(iteration, generation, started).await?;
        let step = self.decide(&verdict);
        // A rehearsal that ends the loop is discarded, so it is not reported.
        if !(self.rehearsing && matches!(step, Step::Finished(_))) {
            self.notify_recorded();
        }
        Ok(step)
    }

    async fn open_stream(
        &mut self,
    ) -> Result<(u32, Instant, BoxRoundStream), LoopError> {
        let iteration = self.begin_iteration()?;
        let started = Instant::now();
        let opening = self.shared.engine.stream_round(self.round_request());
        let round = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(LoopError::Cancelled { iteration });
            }
            result = opening => result
                .map_err(|failure| LoopError::generation(iteration, failure))?,
        };
        Ok((iteration, started, round))
    }

    fn begin_iteration(&mut self) -> Result<u32, LoopError> {
        let iteration = self.state.iteration_count() + 1;
        self.attempted = iteration;
        if self.cancel.is_cancelled() {
            return Err(LoopError::Cancelled { iteration });
        }
        debug!("iteration {iteration} started");
        self.state.set_stage(LoopStage::Running);
        self.shared.observers.iteration_start(iteration);
        Ok(iteration)
    }

    fn round_request(&self) -> RoundRequest {
        RoundRequest {
            model: self.shared.model.clone(),
            instructions: self.shared.instructions.clone(),
            messages: self.state.messages().to_vec(),
            tools: self.shared.tools.clone(),
            tool_stop: self.tool_stop.clone(),
        }
    }

    /// Appends the generation to the history, evaluates it and records the
    /// iteration.
    async fn evaluate(
        &mut self,
        iteration: u32,
        generation: Generation,
        started: Instant,
    ) -> Result<Verdict, LoopError> {
        let shared = Arc::clone(&self.shared);
        shared.observers.iteration_end(iteration, &generation);
        self.state.set_stage(LoopStage::Evaluating);
        self.state.append_generation(&generation);

        let input = EvaluationInput {
            latest: generation.clone(),
            iteration,
            records: self.state.iterations().to_vec(),
            prompt: self.state.prompt().to_owned(),
        };
        let ctx = JudgeContext {
            engine: &shared.engine,
            model: &shared.model,
            instructions: shared.instructions.as_deref(),
            history: self.state.messages(),
        };
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(LoopError::Cancelled { iteration })
            }
            result = shared.evaluator.evaluate(ctx, input) => {
                result.map_err(|source| LoopError::Evaluation { iteration, source })
            }
        };

        self.state.push_record(IterationRecord {
            iteration,
            generation,
            verdict: result.as_ref().ok().cloned(),
            duration: started.elapsed(),
        });
        match &result {
            Ok(verdict) => {
                debug!("iteration {iteration} verdict: {verdict:?}");
            }
            Err(_) => self.notify_recorded(),
        }
        result
    }

    /// Applies the transition rules to an evaluated iteration.
    fn decide(&mut self, verdict: &Verdict) -> Step {
        if verdict.complete {
            return Step::Finished(CompletionReason::Verified);
        }
        if self.shared.stop_when.should_stop(&self.state) {
            return Step::Finished(CompletionReason::MaxIterations);
        }
        if let Some(feedback) = verdict.feedback() {
            trace!("injecting feedback: {feedback}");
            self.state.append_feedback(feedback);
        }
        Step::Continue
    }

    fn notify_recorded(&self) {
        if let Some(record) = self.state.last_record() {
            self.shared.observers.iteration_finish(record);
        }
    }
}
