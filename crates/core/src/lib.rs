//! The outer ralph loop: iterate on a task, verify completion, feed back.
//!
//! A [`RalphLoop`] repeatedly runs a bounded generation round through an
//! [`Engine`](ralph_loop_model::Engine) and asks an [`Evaluator`] whether
//! the original task is done. Incomplete verdicts are injected as feedback
//! into the next iteration, and a [`StopCondition`] bounds how many
//! iterations run. [`RalphLoop::stream`] exposes the final iteration as a
//! stream of events.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod engine_client;
mod error;
pub mod evaluator;
mod observer;
mod outcome;
mod ralph;
mod state;
pub mod stop;
mod verdict;

pub use config::{EvaluatorConfig, LoopConfig};
pub use error::{BoxError, LoopError};
pub use evaluator::{CompletionCheck, EvaluationInput, Evaluator};
pub use outcome::{CompletionReason, LoopOutcome};
pub use ralph::{LoopInput, LoopStream, RalphLoop, RalphLoopBuilder};
pub use state::{IterationRecord, LoopStage, LoopState};
pub use stop::StopCondition;
pub use tokio_util::sync::CancellationToken;
pub use verdict::Verdict;
