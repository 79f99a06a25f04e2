//! Conditions that bound how many iterations the loop runs.

use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

use crate::state::LoopState;

/// Decides whether the loop should stop after an iteration that the
/// evaluator did not report complete.
///
/// Any `Fn(&LoopState) -> bool` closure is a stop condition.
pub trait StopCondition: Send + Sync {
    /// Returns `true` to stop the loop.
    fn should_stop(&self, state: &LoopState) -> bool;
}

impl<F> StopCondition for F
where
    F: Fn(&LoopState) -> bool + Send + Sync,
{
    #[inline]
    fn should_stop(&self, state: &LoopState) -> bool {
        self(state)
    }
}

/// Stops once the given number of iterations has run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IterationCountIs(pub u32);

impl StopCondition for IterationCountIs {
    #[inline]
    fn should_stop(&self, state: &LoopState) -> bool {
        state.iteration_count() >= self.0
    }
}

impl Default for IterationCountIs {
    #[inline]
    fn default() -> Self {
        Self(10)
    }
}

/// Stops once the loop has been running for longer than the duration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElapsedExceeds(pub Duration);

impl StopCondition for ElapsedExceeds {
    #[inline]
    fn should_stop(&self, state: &LoopState) -> bool {
        state.elapsed() > self.0
    }
}

/// Stops once the recorded iterations have used more tokens than the
/// budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenBudgetExceeds(pub u64);

impl StopCondition for TokenBudgetExceeds {
    #[inline]
    fn should_stop(&self, state: &LoopState) -> bool {
        state.total_usage().total() > self.0
    }
}

/// Stops when any of the conditions says so.
#[derive(Default)]
pub struct AnyOf(Vec<Box<dyn StopCondition>>);

impl AnyOf {
    /// Creates an empty composition, which never stops.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition.
    #[inline]
    pub fn with<C: StopCondition + 'static>(mut self, cond: C) -> Self {
        self.0.push(Box::new(cond));
        self
    }

    pub(crate) fn from_boxed(conds: Vec<Box<dyn StopCondition>>) -> Self {
        Self(conds)
    }
}

impl StopCondition for AnyOf {
    fn should_stop(&self, state: &LoopState) -> bool {
        self.0.iter().any(|cond| cond.should_stop(state))
    }
}

impl Debug for AnyOf {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyOf")
            .field("conditions", &self.0.len())
            .finish()
    }
}
