use ralph_loop_model::{Message, RoundRequest, ToolSet, ToolStopCondition};
use thiserror::Error;

use super::JudgeContext;
use crate::error::BoxError;
use crate::verdict::Verdict;

/// The default completion question.
pub const DEFAULT_QUESTION: &str = "Is the original task fully complete? \
Answer YES or NO on the first line. If NO, explain what is still missing \
so it can be fixed in the next attempt.";

/// The default system instructions for judge models.
pub const DEFAULT_JUDGE_INSTRUCTIONS: &str = "You are a strict reviewer. \
Read the conversation between a user and an assistant and judge whether \
the assistant has fully completed the user's original task.";

const AFFIRMATIVE: &[&str] =
    &["YES", "Y", "TRUE", "COMPLETE", "COMPLETED", "DONE", "PASS"];

/// The judge answered with nothing that can be read as a verdict.
#[derive(Debug, Error)]
#[error("the judge returned a malformed verdict: {response:?}")]
pub struct MalformedVerdict {
    response: String,
}

/// Parses a judge's response into a verdict.
///
/// The first alphanumeric word decides, case-insensitively: one of `YES`,
/// `Y`, `TRUE`, `COMPLETE`, `COMPLETED`, `DONE` or `PASS` means complete,
/// anything else means incomplete. The trimmed response is the reason.
pub fn parse_judgement(response: &str) -> Result<Verdict, MalformedVerdict> {
    let response = response.trim();
    let Some(word) = response
        .split(|c: char| !c.is_alphanumeric())
        .find(|word| !word.is_empty())
    else {
        return Err(MalformedVerdict {
            response: response.to_owned(),
        });
    };

    let word = word.to_uppercase();
    Ok(Verdict {
        complete: AFFIRMATIVE.contains(&word.as_str()),
        reason: Some(response.to_owned()),
    })
}

/// Runs one tool-free round asking `question` and parses the answer.
pub(super) async fn ask(
    ctx: JudgeContext<'_>,
    model: String,
    instructions: Option<String>,
    question: &str,
) -> Result<Verdict, BoxError> {
    let mut messages = ctx.history.to_vec();
    messages.push(Message::User(question.to_owned()));
    let req = RoundRequest {
        model,
        instructions,
        messages,
        tools: ToolSet::new(),
        tool_stop: ToolStopCondition::StepCountIs(1),
    };

    debug!("asking judge `{}`", req.model);
    let generation = ctx.engine.run_round(req).await?;
    let verdict = parse_judgement(&generation.text)?;
    debug!("judge says complete: {}", verdict.complete);
    Ok(verdict)
}
