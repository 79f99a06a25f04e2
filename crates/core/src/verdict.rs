use serde::{Deserialize, Serialize};

/// An evaluator's judgment of whether the task is done.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the original task has been completed.
    pub complete: bool,
    /// Why the evaluator decided so. For an incomplete verdict, this is the
    /// feedback the next iteration receives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verdict {
    /// Creates a verdict saying the task is done.
    #[inline]
    pub fn completed() -> Self {
        Self {
            complete: true,
            reason: None,
        }
    }

    /// Creates a verdict saying the task is not done yet, with the feedback
    /// for the next iteration.
    #[inline]
    pub fn incomplete<S: Into<String>>(feedback: S) -> Self {
        Self {
            complete: false,
            reason: Some(feedback.into()),
        }
    }

    /// Attaches a reason to the verdict.
    #[inline]
    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Returns the feedback to inject before the next iteration.
    ///
    /// Only incomplete verdicts with a non-blank reason have one.
    pub fn feedback(&self) -> Option<&str> {
        if self.complete {
            return None;
        }
        self.reason
            .as_deref()
            .filter(|reason| !reason.trim().is_empty())
    }
}

impl From<bool> for Verdict {
    #[inline]
    fn from(complete: bool) -> Self {
        Self {
            complete,
            reason: None,
        }
    }
}
