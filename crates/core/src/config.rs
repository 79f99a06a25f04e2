use std::str::FromStr;

use ralph_loop_model::ToolStopCondition;
use serde::{Deserialize, Serialize};

use crate::evaluator::{
    DEFAULT_JUDGE_INSTRUCTIONS, DEFAULT_QUESTION, Evaluator,
};

/// Loop settings that can be loaded from JSON.
///
/// ```json
/// {
///   "model": "gpt-4.1",
///   "maxIterations": 5,
///   "toolStopWhen": { "stepCountIs": 30 },
///   "evaluator": { "type": "judge-model", "model": "gpt-4.1-mini" }
/// }
/// ```
///
/// Callback evaluators and observers can only be set in code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoopConfig {
    /// The model the loop runs with.
    pub model: String,
    /// System instructions for the loop's model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Maximum number of iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// When each round of the inner loop ends.
    #[serde(default)]
    pub tool_stop_when: ToolStopCondition,
    /// How completion is verified.
    pub evaluator: EvaluatorConfig,
}

#[inline]
fn default_max_iterations() -> u32 {
    10
}

/// The serializable evaluators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EvaluatorConfig {
    /// See [`Evaluator::SelfJudge`].
    SelfJudge {
        /// Overrides the default question.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        question: Option<String>,
    },
    /// See [`Evaluator::JudgeModel`].
    JudgeModel {
        /// The judge model identifier.
        model: String,
        /// Overrides the default question.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        question: Option<String>,
        /// Overrides the default judge instructions.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instructions: Option<String>,
    },
}

impl From<EvaluatorConfig> for Evaluator {
    fn from(config: EvaluatorConfig) -> Self {
        match config {
            EvaluatorConfig::SelfJudge { question } => Evaluator::SelfJudge {
                question: question
                    .unwrap_or_else(|| DEFAULT_QUESTION.to_owned()),
            },
            EvaluatorConfig::JudgeModel {
                model,
                question,
                instructions,
            } => Evaluator::JudgeModel {
                model,
                question: question
                    .unwrap_or_else(|| DEFAULT_QUESTION.to_owned()),
                instructions: instructions
                    .unwrap_or_else(|| DEFAULT_JUDGE_INSTRUCTIONS.to_owned()),
            },
        }
    }
}

impl FromStr for LoopConfig {
    type Err = serde_json::Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}
