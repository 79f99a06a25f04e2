use thiserror::Error;

/// Why a tool call failed.
///
/// The error is never raised to the loop: [`ToolSet::call`] turns it into
/// an error result for the model to read.
///
/// [`ToolSet::call`]: super::ToolSet::call
#[derive(Clone, Debug, PartialEq, Eq, Hash, Error)]
pub enum Error {
    /// The arguments did not match the tool's input type.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The tool ran and failed.
    #[error("{0}")]
    Execution(String),
    /// The model asked for a tool that is not in the set.
    #[error("there is no tool named `{0}`")]
    NotFound(String),
}

impl Error {
    /// Creates an execution error with the reason shown to the model.
    #[inline]
    pub fn execution<S: Into<String>>(reason: S) -> Self {
        Error::Execution(reason.into())
    }
}
