use std::sync::Arc;

use ralph_loop_model::{Engine, Generation, Tool, ToolSet, ToolStopCondition};

use super::{RalphLoop, Shared};
use crate::config::LoopConfig;
use crate::engine_client::EngineClient;
use crate::error::LoopError;
use crate::evaluator::Evaluator;
use crate::observer::Observers;
use crate::outcome::LoopOutcome;
use crate::state::IterationRecord;
use crate::stop::{AnyOf, IterationCountIs, StopCondition};

/// [`RalphLoop`] builder.
pub struct RalphLoopBuilder {
    engine: EngineClient,
    model: Option<String>,
    instructions: Option<String>,
    tools: ToolSet,
    tool_stop: ToolStopCondition,
    evaluator: Option<Evaluator>,
    max_iterations: Option<u32>,
    stop_when: Option<Box<dyn StopCondition>>,
    observers: Observers,
}

impl RalphLoopBuilder {
    /// Creates a new builder with the specified engine.
    #[inline]
    pub fn with_engine<E: Engine + 'static>(engine: E) -> Self {
        Self {
            engine: EngineClient::new(engine),
            model: None,
            instructions: None,
            tools: ToolSet::new(),
            tool_stop: ToolStopCondition::default(),
            evaluator: None,
            max_iterations: None,
            stop_when: None,
            observers: Observers::default(),
        }
    }

    /// Sets the model the loop runs with.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the system instructions.
    #[inline]
    pub fn with_instructions<S: Into<String>>(mut self, instructions: S) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.insert(tool);
        self
    }

    /// Registers all tools in the set.
    #[inline]
    pub fn with_tools(mut self, tools: &ToolSet) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Sets the evaluator. Required.
    #[inline]
    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Stops the loop after the given number of iterations. Defaults to 10
    /// when no other stop condition is set.
    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Sets a custom stop condition. If a maximum number of iterations is
    /// also set, the loop stops when either says so.
    #[inline]
    pub fn stop_when(mut self, cond: impl StopCondition + 'static) -> Self {
        self.stop_when = Some(Box::new(cond));
        self
    }

    /// Sets when each round of the inner loop ends.
    #[inline]
    pub fn tool_stop_when(mut self, tool_stop: ToolStopCondition) -> Self {
        self.tool_stop = tool_stop;
        self
    }

    /// Attaches a callback invoked before each round starts.
    #[inline]
    pub fn on_iteration_start(
        mut self,
        f: impl Fn(u32) + Send + Sync + 'static,
    ) -> Self {
        self.observers.on_iteration_start = Some(Box::new(f));
        self
    }

    /// Attaches a callback invoked when a round has finished, before it is
    /// evaluated.
    #[inline]
    pub fn on_iteration_end(
        mut self,
        f: impl Fn(u32, &Generation) + Send + Sync + 'static,
    ) -> Self {
        self.observers.on_iteration_end = Some(Box::new(f));
        self
    }

    /// Attaches a callback invoked when an iteration has been recorded.
    ///
    /// It runs after the evaluator, so the record carries the verdict. An
    /// iteration whose evaluation failed or was cancelled is reported
    /// without one.
    #[inline]
    pub fn on_iteration_finish(
        mut self,
        f: impl Fn(&IterationRecord) + Send + Sync + 'static,
    ) -> Self {
        self.observers.on_iteration_finish = Some(Box::new(f));
        self
    }

    /// Attaches a callback invoked with the outcome of each invocation.
    #[inline]
    pub fn on_finish(
        mut self,
        f: impl Fn(&LoopOutcome) + Send + Sync + 'static,
    ) -> Self {
        self.observers.on_finish = Some(Box::new(f));
        self
    }

    /// Applies the settings from a [`LoopConfig`].
    pub fn with_config(mut self, config: LoopConfig) -> Self {
        let LoopConfig {
            model,
            instructions,
            max_iterations,
            tool_stop_when,
            evaluator,
        } = config;
        self.model = Some(model);
        if instructions.is_some() {
            self.instructions = instructions;
        }
        self.max_iterations = Some(max_iterations);
        self.tool_stop = tool_stop_when;
        self.evaluator = Some(evaluator.into());
        self
    }

    /// Builds the loop.
    ///
    /// Fails if the model is missing or blank, no evaluator is set, the
    /// evaluator is misconfigured, or the maximum number of iterations is
    /// zero.
    pub fn build(self) -> Result<RalphLoop, LoopError> {
        let RalphLoopBuilder {
            engine,
            model,
            instructions,
            tools,
            tool_stop,
            evaluator,
            max_iterations,
            stop_when,
            observers,
        } = self;

        let model = model
            .filter(|model| !model.trim().is_empty())
            .ok_or_else(|| {
                LoopError::Configuration("a model is required".to_owned())
            })?;
        let evaluator = evaluator.ok_or_else(|| {
            LoopError::Configuration("an evaluator is required".to_owned())
        })?;
        evaluator.validate().map_err(LoopError::Configuration)?;
        if max_iterations == Some(0) {
            return Err(LoopError::Configuration(
                "max iterations must be at least 1".to_owned(),
            ));
        }

        let stop_when: Box<dyn StopCondition> =
            match (max_iterations, stop_when) {
                (Some(max), Some(custom)) => {
                    let max: Box<dyn StopCondition> =
                        Box::new(IterationCountIs(max));
                    Box::new(AnyOf::from_boxed(vec![max, custom]))
                }
                (None, Some(custom)) => custom,
                (max, None) => Box::new(
                    max.map_or_else(IterationCountIs::default, IterationCountIs),
                ),
            };

        debug!(
            "built a loop on `{model}` with {} tool(s), evaluator: {evaluator:?}",
            tools.len()
        );
        Ok(RalphLoop {
            shared: Arc::new(Shared {
                engine,
                model,
                instructions,
                tools,
                tool_stop,
                evaluator,
                stop_when,
                observers,
            }),
        })
    }
}
