use async_trait::async_trait;

use super::EvaluationInput;
use crate::error::BoxError;
use crate::verdict::Verdict;

/// Caller-supplied completion check.
///
/// Implemented for async closures taking an [`EvaluationInput`] and
/// returning `Result<O, E>`, where `O` is `bool` or [`Verdict`] and `E`
/// converts into a boxed error. An error aborts the loop.
#[async_trait]
pub trait CompletionCheck: Send + Sync {
    /// Checks whether the task is done.
    async fn check(&self, input: EvaluationInput) -> Result<Verdict, BoxError>;
}

#[async_trait]
impl<F, Fut, O, E> CompletionCheck for F
where
    F: Fn(EvaluationInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Into<Verdict> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    async fn check(&self, input: EvaluationInput) -> Result<Verdict, BoxError> {
        (self)(input).await.map(Into::into).map_err(Into::into)
    }
}
