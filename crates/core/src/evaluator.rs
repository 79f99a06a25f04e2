//! Evaluators decide whether the original task is done after each
//! iteration.

mod callback;
mod judge;

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use ralph_loop_model::{Generation, Message};

pub use callback::CompletionCheck;
pub use judge::{
    DEFAULT_JUDGE_INSTRUCTIONS, DEFAULT_QUESTION, MalformedVerdict,
    parse_judgement,
};

use crate::engine_client::EngineClient;
use crate::error::BoxError;
use crate::state::IterationRecord;
use crate::verdict::Verdict;

/// What an evaluator receives after an iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationInput {
    /// The generation of the iteration being evaluated.
    pub latest: Generation,
    /// Index of the iteration being evaluated.
    pub iteration: u32,
    /// Records of all previous iterations.
    pub records: Vec<IterationRecord>,
    /// The original prompt.
    pub prompt: String,
}

/// The strategy used to verify completion.
#[derive(Clone)]
pub enum Evaluator {
    /// Asks the loop's own model, with the loop's instructions, whether the
    /// task is done.
    SelfJudge {
        /// The completion question appended as the last user turn.
        question: String,
    },
    /// Asks a distinct judge model whether the task is done.
    JudgeModel {
        /// The judge model identifier.
        model: String,
        /// The completion question appended as the last user turn.
        question: String,
        /// System instructions for the judge.
        instructions: String,
    },
    /// Runs caller-supplied code, without any generation call.
    Callback(Arc<dyn CompletionCheck>),
}

impl Evaluator {
    /// Creates a self-judge evaluator with the default question.
    #[inline]
    pub fn self_judge() -> Self {
        Evaluator::SelfJudge {
            question: DEFAULT_QUESTION.to_owned(),
        }
    }

    /// Creates a judge-model evaluator with the default question and
    /// instructions.
    #[inline]
    pub fn judge_model<S: Into<String>>(model: S) -> Self {
        Evaluator::JudgeModel {
            model: model.into(),
            question: DEFAULT_QUESTION.to_owned(),
            instructions: DEFAULT_JUDGE_INSTRUCTIONS.to_owned(),
        }
    }

    /// Creates an evaluator from a completion check, which can be an async
    /// closure returning `Result<bool, _>` or `Result<Verdict, _>`.
    #[inline]
    pub fn callback<C: CompletionCheck + 'static>(check: C) -> Self {
        Evaluator::Callback(Arc::new(check))
    }

    /// Replaces the completion question. Has no effect on callbacks.
    pub fn with_question<S: Into<String>>(mut self, new_question: S) -> Self {
        match &mut self {
            Evaluator::SelfJudge { question }
            | Evaluator::JudgeModel { question, .. } => {
                *question = new_question.into();
            }
            Evaluator::Callback(_) => {}
        }
        self
    }

    /// Replaces the judge instructions. Only judge models have their own.
    pub fn with_judge_instructions<S: Into<String>>(
        mut self,
        new_instructions: S,
    ) -> Self {
        if let Evaluator::JudgeModel { instructions, .. } = &mut self {
            *instructions = new_instructions.into();
        }
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            Evaluator::SelfJudge { question } => {
                if question.trim().is_empty() {
                    return Err("the judge question is blank".to_owned());
                }
            }
            Evaluator::JudgeModel {
                model, question, ..
            } => {
                if model.trim().is_empty() {
                    return Err("the judge model is blank".to_owned());
                }
                if question.trim().is_empty() {
                    return Err("the judge question is blank".to_owned());
                }
            }
            Evaluator::Callback(_) => {}
        }
        Ok(())
    }

    pub(crate) async fn evaluate(
        &self,
        ctx: JudgeContext<'_>,
        input: EvaluationInput,
    ) -> Result<Verdict, BoxError> {
        match self {
            Evaluator::SelfJudge { question } => {
                let instructions = ctx.instructions.map(ToOwned::to_owned);
                let model = ctx.model.to_owned();
                judge::ask(ctx, model, instructions, question).await
            }
            Evaluator::JudgeModel {
                model,
                question,
                instructions,
            } => {
                let instructions = Some(instructions.clone());
                judge::ask(ctx, model.clone(), instructions, question).await
            }
            Evaluator::Callback(check) => check.check(input).await,
        }
    }
}

impl Debug for Evaluator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Evaluator::SelfJudge { question } => f
                .debug_struct("SelfJudge")
                .field("question", question)
                .finish(),
            Evaluator::JudgeModel {
                model, question, ..
            } => f
                .debug_struct("JudgeModel")
                .field("model", model)
                .field("question", question)
                .finish_non_exhaustive(),
            Evaluator::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// What judge evaluators need from the loop.
pub(crate) struct JudgeContext<'a> {
    pub(crate) engine: &'a EngineClient,
    pub(crate) model: &'a str,
    pub(crate) instructions: Option<&'a str>,
    /// The history, including the latest generation.
    pub(crate) history: &'a [Message],
}
